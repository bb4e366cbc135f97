// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{anyhow, bail, Result};
use cofhe_crypto::codec::{
    deserialize_tensor, encode_ciphertext, encode_plaintext, parse_ciphertext, parse_plaintext,
    serialize_tensor,
};
use cofhe_crypto::{Ciphertext, CryptoSystem, GroupArith, Plaintext, PublicKey};
use cofhe_multithread::TaskPool;
use cofhe_net::messages::{
    ComputeRequest, Encryption, OpKind, Operand, OperandKind, Operation, ServiceResponse,
};
use cofhe_net::{RequestEnvelope, RequestHandler, ResponseEnvelope, ServiceType, Status};
use cofhe_smpc::{CipherMultiplier, SmpcClient};
use cofhe_tensor::Tensor;
use tracing::debug;

/// Dispatches compute requests over the homomorphic primitives: local
/// operations run on the worker pool, anything needing the decryption
/// oracle goes through the SMPC client. Every operand lives only for the
/// duration of its request.
pub struct ComputeNodeHandler<G: GroupArith> {
    system: CryptoSystem<G>,
    public_key: PublicKey,
    smpc: SmpcClient<G>,
    pool: TaskPool,
}

fn operand_text(operand: &Operand) -> Result<String> {
    Ok(std::str::from_utf8(&operand.data)
        .map_err(|_| anyhow!("operand is not ASCII"))?
        .to_string())
}

impl<G: GroupArith> ComputeNodeHandler<G> {
    pub fn new(system: CryptoSystem<G>, smpc: SmpcClient<G>, pool: TaskPool) -> Self {
        let public_key = smpc.public_key().clone();
        ComputeNodeHandler {
            system,
            public_key,
            smpc,
            pool,
        }
    }

    pub fn smpc(&self) -> &SmpcClient<G> {
        &self.smpc
    }

    async fn dispatch(&self, body: &[u8]) -> ServiceResponse {
        let request = match ComputeRequest::from_bytes(body) {
            Ok(r) => r,
            Err(e) => return ServiceResponse::error(e.to_string()),
        };
        debug!(kind = ?request.op_kind, op = ?request.operation, operands = request.operands.len(), "compute request");
        let result = match request.op_kind {
            OpKind::Unary => self.handle_unary(&request).await,
            OpKind::Binary => self.handle_binary(&request).await,
            OpKind::Ternary => Err(anyhow!("not implemented: ternary operations")),
        };
        match result {
            Ok(payload) => ServiceResponse::ok(payload),
            Err(e) => ServiceResponse::error(format!("{e:#}")),
        }
    }

    async fn handle_unary(&self, request: &ComputeRequest) -> Result<Vec<u8>> {
        if request.operands.len() != 1 {
            bail!("invalid operation: unary operations take 1 operand");
        }
        if request.operation != Operation::Decrypt {
            bail!("not implemented: unary {:?}", request.operation);
        }
        let operand = &request.operands[0];
        if operand.encryption != Encryption::Cipher {
            bail!("invalid data encryption type: decrypt takes a ciphertext");
        }
        match operand.kind {
            OperandKind::Single => {
                let ct = parse_ciphertext(&operand_text(operand)?)?;
                let pt = self.smpc.decrypt(&ct).await?;
                Ok(encode_plaintext(&pt).into_bytes())
            }
            OperandKind::Tensor => {
                let cts: Tensor<Ciphertext> = deserialize_tensor(&operand.data)?;
                let pts = self.smpc.decrypt_tensor(&cts).await?;
                Ok(serialize_tensor(&pts))
            }
            OperandKind::TensorId => bail!("not implemented: tensor-id operands"),
        }
    }

    async fn handle_binary(&self, request: &ComputeRequest) -> Result<Vec<u8>> {
        if request.operands.len() != 2 {
            bail!("invalid operation: binary operations take 2 operands");
        }
        let (a, b) = (&request.operands[0], &request.operands[1]);
        if (a.kind == OperandKind::Single || b.kind == OperandKind::Single) && a.kind != b.kind {
            bail!("type mismatch: single and tensor operands cannot mix");
        }
        if a.kind == OperandKind::TensorId || b.kind == OperandKind::TensorId {
            bail!("not implemented: tensor-id operands");
        }
        match (request.operation, a.kind) {
            (Operation::Add, OperandKind::Single) => self.single_addition(a, b).await,
            (Operation::Add, _) => self.tensor_addition(a, b).await,
            (Operation::Multiply, OperandKind::Single) => self.single_multiplication(a, b).await,
            (Operation::Multiply, _) => self.tensor_multiplication(a, b).await,
            (Operation::Subtract | Operation::Divide, _) => {
                bail!("not implemented: {:?}", request.operation)
            }
            (Operation::Decrypt, _) => bail!("invalid operation: decrypt is unary"),
        }
    }

    async fn single_addition(&self, a: &Operand, b: &Operand) -> Result<Vec<u8>> {
        let system = self.system.clone();
        let pk = self.public_key.clone();
        let (ea, eb) = (a.encryption, b.encryption);
        let (da, db) = (operand_text(a)?, operand_text(b)?);
        self.pool
            .spawn("add-single", move || -> Result<Vec<u8>> {
                let ct = match (ea, eb) {
                    (Encryption::Cipher, Encryption::Cipher) => {
                        system.add(&pk, &parse_ciphertext(&da)?, &parse_ciphertext(&db)?)
                    }
                    (Encryption::Plain, Encryption::Plain) => {
                        let sum = system.add_plain(&parse_plaintext(&da)?, &parse_plaintext(&db)?);
                        system.encrypt(&pk, &sum)
                    }
                    (Encryption::Cipher, Encryption::Plain) => {
                        let enc = system.encrypt(&pk, &parse_plaintext(&db)?);
                        system.add(&pk, &parse_ciphertext(&da)?, &enc)
                    }
                    (Encryption::Plain, Encryption::Cipher) => {
                        let enc = system.encrypt(&pk, &parse_plaintext(&da)?);
                        system.add(&pk, &enc, &parse_ciphertext(&db)?)
                    }
                };
                Ok(encode_ciphertext(&ct).into_bytes())
            })
            .await?
    }

    async fn tensor_addition(&self, a: &Operand, b: &Operand) -> Result<Vec<u8>> {
        let system = self.system.clone();
        let pk = self.public_key.clone();
        let (ea, eb) = (a.encryption, b.encryption);
        let (da, db) = (a.data.clone(), b.data.clone());
        self.pool
            .spawn("add-tensor", move || -> Result<Vec<u8>> {
                let out = match (ea, eb) {
                    (Encryption::Cipher, Encryption::Cipher) => {
                        let ct1: Tensor<Ciphertext> = deserialize_tensor(&da)?;
                        let ct2: Tensor<Ciphertext> = deserialize_tensor(&db)?;
                        system.add_tensors(&pk, &ct1, &ct2)?
                    }
                    (Encryption::Plain, Encryption::Plain) => {
                        let pt1: Tensor<Plaintext> = deserialize_tensor(&da)?;
                        let pt2: Tensor<Plaintext> = deserialize_tensor(&db)?;
                        system.encrypt_tensor(&pk, &system.add_plain_tensors(&pt1, &pt2)?)?
                    }
                    (Encryption::Cipher, Encryption::Plain) => {
                        let ct: Tensor<Ciphertext> = deserialize_tensor(&da)?;
                        let pt: Tensor<Plaintext> = deserialize_tensor(&db)?;
                        system.add_tensors(&pk, &ct, &system.encrypt_tensor(&pk, &pt)?)?
                    }
                    (Encryption::Plain, Encryption::Cipher) => {
                        let pt: Tensor<Plaintext> = deserialize_tensor(&da)?;
                        let ct: Tensor<Ciphertext> = deserialize_tensor(&db)?;
                        system.add_tensors(&pk, &system.encrypt_tensor(&pk, &pt)?, &ct)?
                    }
                };
                Ok(serialize_tensor(&out))
            })
            .await?
    }

    async fn single_multiplication(&self, a: &Operand, b: &Operand) -> Result<Vec<u8>> {
        if (a.encryption, b.encryption) == (Encryption::Cipher, Encryption::Cipher) {
            let ct1 = parse_ciphertext(&operand_text(a)?)?;
            let ct2 = parse_ciphertext(&operand_text(b)?)?;
            let multiplier = CipherMultiplier::new(&self.smpc);
            let product = multiplier.mul(&ct1, &ct2).await?;
            return Ok(encode_ciphertext(&product).into_bytes());
        }
        let system = self.system.clone();
        let pk = self.public_key.clone();
        let (ea, eb) = (a.encryption, b.encryption);
        let (da, db) = (operand_text(a)?, operand_text(b)?);
        self.pool
            .spawn("mul-single", move || -> Result<Vec<u8>> {
                let ct = match (ea, eb) {
                    (Encryption::Plain, Encryption::Plain) => {
                        let product =
                            system.mul_plain(&parse_plaintext(&da)?, &parse_plaintext(&db)?);
                        system.encrypt(&pk, &product)
                    }
                    (Encryption::Cipher, Encryption::Plain) => {
                        system.scal(&pk, &parse_plaintext(&db)?, &parse_ciphertext(&da)?)
                    }
                    (Encryption::Plain, Encryption::Cipher) => {
                        system.scal(&pk, &parse_plaintext(&da)?, &parse_ciphertext(&db)?)
                    }
                    (Encryption::Cipher, Encryption::Cipher) => unreachable!("handled above"),
                };
                Ok(encode_ciphertext(&ct).into_bytes())
            })
            .await?
    }

    async fn tensor_multiplication(&self, a: &Operand, b: &Operand) -> Result<Vec<u8>> {
        if (a.encryption, b.encryption) == (Encryption::Cipher, Encryption::Cipher) {
            let ct1: Tensor<Ciphertext> = deserialize_tensor(&a.data)?;
            let ct2: Tensor<Ciphertext> = deserialize_tensor(&b.data)?;
            let multiplier = CipherMultiplier::new(&self.smpc);
            let product = multiplier.mul_tensors(&ct1, &ct2).await?;
            return Ok(serialize_tensor(&product));
        }
        let system = self.system.clone();
        let pk = self.public_key.clone();
        let (ea, eb) = (a.encryption, b.encryption);
        let (da, db) = (a.data.clone(), b.data.clone());
        self.pool
            .spawn("mul-tensor", move || -> Result<Vec<u8>> {
                let out = match (ea, eb) {
                    (Encryption::Plain, Encryption::Plain) => {
                        let pt1: Tensor<Plaintext> = deserialize_tensor(&da)?;
                        let pt2: Tensor<Plaintext> = deserialize_tensor(&db)?;
                        system.encrypt_tensor(&pk, &system.mul_plain_tensors(&pt1, &pt2)?)?
                    }
                    (Encryption::Cipher, Encryption::Plain) => {
                        let ct: Tensor<Ciphertext> = deserialize_tensor(&da)?;
                        let pt: Tensor<Plaintext> = deserialize_tensor(&db)?;
                        system.scal_tensors(&pk, &pt, &ct)?
                    }
                    (Encryption::Plain, Encryption::Cipher) => {
                        let pt: Tensor<Plaintext> = deserialize_tensor(&da)?;
                        let ct: Tensor<Ciphertext> = deserialize_tensor(&db)?;
                        system.scal_tensors(&pk, &pt, &ct)?
                    }
                    (Encryption::Cipher, Encryption::Cipher) => unreachable!("handled above"),
                };
                Ok(serialize_tensor(&out))
            })
            .await?
    }
}

impl<G: GroupArith> RequestHandler for ComputeNodeHandler<G> {
    async fn handle(&self, request: RequestEnvelope) -> ResponseEnvelope {
        if request.service != ServiceType::Compute {
            return ResponseEnvelope::new(
                request.service,
                Status::Error,
                b"wrong service for compute node".to_vec(),
            );
        }
        let response = self.dispatch(&request.body).await;
        ResponseEnvelope::new(ServiceType::Compute, Status::Ok, response.to_bytes())
    }
}
