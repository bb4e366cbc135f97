// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

pub mod cofhe;
pub mod compute;
pub mod setup;

pub use cofhe::CofheNodeHandler;
pub use compute::ComputeNodeHandler;
pub use setup::SetupNodeHandler;
