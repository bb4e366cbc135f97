// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::sync::{Arc, Mutex};

/// Deterministic shared RNG for tests.
pub fn shared_rng_from_seed(seed: u64) -> Arc<Mutex<ChaCha20Rng>> {
    Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed)))
}

/// Picks a free localhost port by binding to port zero and dropping the
/// listener. Racy in principle, good enough for tests.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind to ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}
