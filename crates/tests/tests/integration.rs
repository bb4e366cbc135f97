// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! End-to-end scenarios over a full in-process network: one setup node,
//! a 2-of-3 cofhe quorum and one compute node on localhost.

use anyhow::Result;
use cofhe_crypto::codec::{
    deserialize_tensor, encode_ciphertext, encode_plaintext, parse_ciphertext, parse_plaintext,
    serialize_tensor,
};
use cofhe_crypto::{Ciphertext, Plaintext};
use cofhe_net::messages::{
    CofheRequest, CofheRequestKind, ComputeRequest, Encryption, JoinRequest, JoinRole, OpKind,
    Operand, OperandKind, Operation, PartialDecryptionRequest, ServiceResponse, SetupRequest,
    SetupRequestKind,
};
use cofhe_net::{Client, ServiceType, Status};
use cofhe_node::ClientNode;
use cofhe_tensor::Tensor;
use cofhe_tests::{spawn_network, test_config};
use std::time::Duration;

fn single_cipher(ct: &Ciphertext) -> Operand {
    Operand::new(
        OperandKind::Single,
        Encryption::Cipher,
        encode_ciphertext(ct).into_bytes(),
    )
}

fn tensor_cipher(cts: &Tensor<Ciphertext>) -> Operand {
    Operand::new(OperandKind::Tensor, Encryption::Cipher, serialize_tensor(cts))
}

async fn request_single_decrypt(client: &ClientNode, payload: Vec<u8>) -> Result<Plaintext> {
    let request = ComputeRequest::new(
        OpKind::Unary,
        Operation::Decrypt,
        vec![Operand::new(OperandKind::Single, Encryption::Cipher, payload)],
    );
    let data = client.compute(&request).await?.into_result()?;
    Ok(parse_plaintext(std::str::from_utf8(&data)?)?)
}

async fn request_tensor_decrypt(
    client: &ClientNode,
    payload: Vec<u8>,
) -> Result<Tensor<Plaintext>> {
    let request = ComputeRequest::new(
        OpKind::Unary,
        Operation::Decrypt,
        vec![Operand::new(OperandKind::Tensor, Encryption::Cipher, payload)],
    );
    let data = client.compute(&request).await?.into_result()?;
    Ok(deserialize_tensor(&data)?)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_ciphertext_multiplication_end_to_end() -> Result<()> {
    let config = test_config();
    let network = spawn_network(&config, false).await?;
    let client = ClientNode::connect("127.0.0.1", network.setup_port, &config).await?;
    let cs = client.system();
    let pk = client.network_public_key();

    let x = cs.encrypt(pk, &Plaintext::from_u64(230));
    let y = cs.encrypt(pk, &Plaintext::from_u64(20));
    let request = ComputeRequest::new(
        OpKind::Binary,
        Operation::Multiply,
        vec![single_cipher(&x), single_cipher(&y)],
    );
    let product = client.compute(&request).await?.into_result()?;

    let decrypted = request_single_decrypt(&client, product).await?;
    assert_eq!(decrypted, Plaintext::from_u64(4600));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tensor_matmul_8x8_end_to_end() -> Result<()> {
    let config = test_config();
    let network = spawn_network(&config, false).await?;
    let client = ClientNode::connect("127.0.0.1", network.setup_port, &config).await?;
    let cs = client.system();
    let pk = client.network_public_key();

    let (n, m, p) = (8usize, 8usize, 8usize);
    let a = Tensor::from_fn(&[n, m], |i| Plaintext::from_u64(i as u64 + 1));
    let b = Tensor::from_fn(&[m, p], |i| Plaintext::from_u64(i as u64 + 1));
    let ca = cs.encrypt_tensor(pk, &a)?;
    let cb = cs.encrypt_tensor(pk, &b)?;

    let request = ComputeRequest::new(
        OpKind::Binary,
        Operation::Multiply,
        vec![tensor_cipher(&ca), tensor_cipher(&cb)],
    );
    let product = client.compute(&request).await?.into_result()?;
    let decrypted = request_tensor_decrypt(&client, product).await?;

    assert_eq!(decrypted.shape(), &[n, p]);
    for i in 0..n {
        for k in 0..p {
            let mut expected = 0u64;
            for j in 0..m {
                expected += ((i * m + j) as u64 + 1) * ((j * p + k) as u64 + 1);
            }
            assert_eq!(
                decrypted.at2(i, k).unwrap(),
                &Plaintext::from_u64(expected),
                "cell ({i}, {k})"
            );
        }
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tensor_addition_of_ones_is_all_twos() -> Result<()> {
    let config = test_config();
    let network = spawn_network(&config, false).await?;
    let client = ClientNode::connect("127.0.0.1", network.setup_port, &config).await?;
    let cs = client.system();
    let pk = client.network_public_key();

    let ones = Tensor::new(&[64, 64], Plaintext::from_u64(1));
    let ct = cs.encrypt_tensor(pk, &ones)?;
    let request = ComputeRequest::new(
        OpKind::Binary,
        Operation::Add,
        vec![tensor_cipher(&ct), tensor_cipher(&ct)],
    );
    let sum = client.compute(&request).await?.into_result()?;
    let decrypted = request_tensor_decrypt(&client, sum).await?;
    assert_eq!(decrypted, Tensor::new(&[64, 64], Plaintext::from_u64(2)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_operand_dispatch() -> Result<()> {
    let config = test_config();
    let network = spawn_network(&config, false).await?;
    let client = ClientNode::connect("127.0.0.1", network.setup_port, &config).await?;
    let cs = client.system();
    let pk = client.network_public_key();

    // plain + plain comes back re-encrypted
    let request = ComputeRequest::new(
        OpKind::Binary,
        Operation::Add,
        vec![
            Operand::new(
                OperandKind::Single,
                Encryption::Plain,
                encode_plaintext(&Plaintext::from_u64(230)).into_bytes(),
            ),
            Operand::new(
                OperandKind::Single,
                Encryption::Plain,
                encode_plaintext(&Plaintext::from_u64(20)).into_bytes(),
            ),
        ],
    );
    let sum = client.compute(&request).await?.into_result()?;
    assert_eq!(
        request_single_decrypt(&client, sum).await?,
        Plaintext::from_u64(250)
    );

    // cipher x plain routes through scalar multiplication
    let ct = cs.encrypt(pk, &Plaintext::from_u64(7));
    let request = ComputeRequest::new(
        OpKind::Binary,
        Operation::Multiply,
        vec![
            single_cipher(&ct),
            Operand::new(
                OperandKind::Single,
                Encryption::Plain,
                encode_plaintext(&Plaintext::from_u64(6)).into_bytes(),
            ),
        ],
    );
    let scaled = client.compute(&request).await?.into_result()?;
    assert_eq!(
        request_single_decrypt(&client, scaled).await?,
        Plaintext::from_u64(42)
    );

    // mixing single and tensor operands is a type mismatch
    let ones = Tensor::new(&[2, 2], Plaintext::from_u64(1));
    let tensor_ct = cs.encrypt_tensor(pk, &ones)?;
    let request = ComputeRequest::new(
        OpKind::Binary,
        Operation::Add,
        vec![single_cipher(&ct), tensor_cipher(&tensor_ct)],
    );
    let response = client.compute(&request).await?;
    assert_eq!(response.status, Status::Error);
    assert!(String::from_utf8_lossy(&response.data).contains("type mismatch"));

    // ternary operations are reserved
    let request = ComputeRequest::new(OpKind::Ternary, Operation::Add, vec![]);
    let response = client.compute(&request).await?;
    assert_eq!(response.status, Status::Error);
    assert!(String::from_utf8_lossy(&response.data).contains("not implemented"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unknown_combination_rank_is_rejected() -> Result<()> {
    let config = test_config();
    let network = spawn_network(&config, false).await?;
    let client = ClientNode::connect("127.0.0.1", network.setup_port, &config).await?;
    let cs = client.system();
    let ct = cs.encrypt(client.network_public_key(), &Plaintext::from_u64(5));

    let mut cofhe = Client::connect(
        "127.0.0.1",
        network.cofhe_ports[1],
        Duration::from_secs(10),
    )
    .await?;
    let inner = PartialDecryptionRequest::new(
        99, // no such combination
        OperandKind::Single,
        encode_ciphertext(&ct).into_bytes(),
    );
    let request = CofheRequest::new(CofheRequestKind::PartialDecryption, inner.to_bytes());
    let envelope = cofhe.run(ServiceType::Cofhe, request.to_bytes()).await?;
    let response = ServiceResponse::from_bytes(&envelope.body)?;
    assert_eq!(response.status, Status::Error);
    assert!(String::from_utf8_lossy(&response.data).contains("threshold not met"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn quorum_survives_a_dark_cofhe_node() -> Result<()> {
    let config = test_config();
    // first cofhe node joins the registry but never serves
    let network = spawn_network(&config, true).await?;
    let client = ClientNode::connect("127.0.0.1", network.setup_port, &config).await?;
    let cs = client.system();
    let pk = client.network_public_key();

    let x = cs.encrypt(pk, &Plaintext::from_u64(12));
    let y = cs.encrypt(pk, &Plaintext::from_u64(34));
    let request = ComputeRequest::new(
        OpKind::Binary,
        Operation::Multiply,
        vec![single_cipher(&x), single_cipher(&y)],
    );
    let product = client.compute(&request).await?.into_result()?;
    assert_eq!(
        request_single_decrypt(&client, product).await?,
        Plaintext::from_u64(408)
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn beaver_cache_refills_once_for_a_hundred_multiplications() -> Result<()> {
    let config = test_config();
    let network = spawn_network(&config, false).await?;
    let client = ClientNode::connect("127.0.0.1", network.setup_port, &config).await?;
    let cs = client.system();
    let pk = client.network_public_key();

    for i in 0..100u64 {
        let x = cs.encrypt(pk, &Plaintext::from_u64(i + 1));
        let y = cs.encrypt(pk, &Plaintext::from_u64(2));
        let request = ComputeRequest::new(
            OpKind::Binary,
            Operation::Multiply,
            vec![single_cipher(&x), single_cipher(&y)],
        );
        let product = client.compute(&request).await?.into_result()?;
        assert_eq!(
            request_single_decrypt(&client, product).await?,
            Plaintext::from_u64((i + 1) * 2)
        );
    }
    // one refill (of cache size + 1) covered the first multiplication and
    // the 99 that followed
    assert_eq!(network.setup_handler.beaver_requests(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn join_is_rejected_once_the_quorum_is_full() -> Result<()> {
    let config = test_config();
    let network = spawn_network(&config, false).await?;

    let mut setup = Client::connect("127.0.0.1", network.setup_port, Duration::from_secs(10))
        .await?;
    let join = JoinRequest {
        role: JoinRole::Cofhe,
        host: "127.0.0.1".into(),
        port: 1,
    };
    let request = SetupRequest::new(SetupRequestKind::JoinAsNode, join.to_bytes());
    let envelope = setup.run(ServiceType::Setup, request.to_bytes()).await?;
    let payload = ServiceResponse::from_bytes(&envelope.body)?.into_result()?;
    let response = cofhe_net::messages::JoinResponse::from_bytes(&payload)?;
    assert_eq!(response.status, Status::Error);
    assert!(response.error.contains("no more nodes can join"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wire_round_trip_preserves_ciphertext_tensors() -> Result<()> {
    let config = test_config();
    let network = spawn_network(&config, false).await?;
    let client = ClientNode::connect("127.0.0.1", network.setup_port, &config).await?;
    let cs = client.system();
    let pk = client.network_public_key();

    let pts = Tensor::from_fn(&[3, 5], |i| Plaintext::from_u64(i as u64));
    let cts = cs.encrypt_tensor(pk, &pts)?;

    // add an encrypted zero tensor: the reply travels the full wire path
    let zeros = cs.encrypt_tensor(pk, &Tensor::new(&[3, 5], Plaintext::from_u64(0)))?;
    let request = ComputeRequest::new(
        OpKind::Binary,
        Operation::Add,
        vec![tensor_cipher(&cts), tensor_cipher(&zeros)],
    );
    let sum = client.compute(&request).await?.into_result()?;
    let returned: Tensor<Ciphertext> = deserialize_tensor(&sum)?;
    assert_eq!(returned.shape(), &[3, 5]);
    let decrypted = request_tensor_decrypt(&client, serialize_tensor(&returned)).await?;
    assert_eq!(decrypted, pts);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ciphertext_parsing_survives_the_text_codec() -> Result<()> {
    let config = test_config();
    let network = spawn_network(&config, false).await?;
    let client = ClientNode::connect("127.0.0.1", network.setup_port, &config).await?;
    let cs = client.system();
    let ct = cs.encrypt(client.network_public_key(), &Plaintext::from_u64(9));
    assert_eq!(parse_ciphertext(&encode_ciphertext(&ct))?, ct);
    Ok(())
}
