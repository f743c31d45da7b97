/*++

Licensed under the Apache-2.0 license.

File Name:

    aes.rs

Abstract:

    File contains API for AES-128/256 block operations and the CBC and XTS
    modes of operation.

--*/

use crate::{AegisError, AegisResult};
use aes::cipher::consts::U16;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{
    BlockCipher, BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, BlockSizeUser,
    InnerIvInit, KeyInit,
};
use aes::{Aes128, Aes256};
use zeroize::Zeroize;

pub const AES_BLOCK_SIZE_BYTES: usize = 16;
pub const AES_128_KEY_SIZE_BYTES: usize = 16;
pub const AES_256_KEY_SIZE_BYTES: usize = 32;

/// Expanded AES key schedule.
///
/// The round keys are zeroized when the context is dropped.
#[derive(Clone)]
pub enum AesContext {
    Aes128(Aes128),
    Aes256(Aes256),
}

impl AesContext {
    /// Expand a 128 or 256 bit key
    ///
    /// # Arguments
    ///
    /// * `key` - 16 or 32 byte key
    pub fn new(key: &[u8]) -> AegisResult<Self> {
        match key.len() {
            AES_128_KEY_SIZE_BYTES => Aes128::new_from_slice(key)
                .map(AesContext::Aes128)
                .map_err(|_| AegisError::DRIVER_AES_INVALID_KEY_SIZE),
            AES_256_KEY_SIZE_BYTES => Aes256::new_from_slice(key)
                .map(AesContext::Aes256)
                .map_err(|_| AegisError::DRIVER_AES_INVALID_KEY_SIZE),
            _ => Err(AegisError::DRIVER_AES_INVALID_KEY_SIZE),
        }
    }

    pub fn key_bits(&self) -> usize {
        match self {
            AesContext::Aes128(_) => 128,
            AesContext::Aes256(_) => 256,
        }
    }

    /// Encrypt a single block
    pub fn encrypt_block(&self, block: &[u8; AES_BLOCK_SIZE_BYTES]) -> [u8; AES_BLOCK_SIZE_BYTES] {
        let mut out = GenericArray::clone_from_slice(block);
        match self {
            AesContext::Aes128(c) => c.encrypt_block(&mut out),
            AesContext::Aes256(c) => c.encrypt_block(&mut out),
        }
        out.into()
    }

    /// Decrypt a single block
    pub fn decrypt_block(&self, block: &[u8; AES_BLOCK_SIZE_BYTES]) -> [u8; AES_BLOCK_SIZE_BYTES] {
        let mut out = GenericArray::clone_from_slice(block);
        match self {
            AesContext::Aes128(c) => c.decrypt_block(&mut out),
            AesContext::Aes256(c) => c.decrypt_block(&mut out),
        }
        out.into()
    }
}

fn check_cbc_args(iv: &[u8], input: &[u8], output: &[u8]) -> AegisResult<()> {
    if iv.len() != AES_BLOCK_SIZE_BYTES {
        return Err(AegisError::DRIVER_AES_INVALID_IV_SIZE);
    }
    if input.len() % AES_BLOCK_SIZE_BYTES != 0 {
        return Err(AegisError::DRIVER_AES_INVALID_DATA_SIZE);
    }
    if output.len() < input.len() {
        return Err(AegisError::DRIVER_AES_BUFFER_TOO_SMALL);
    }
    Ok(())
}

fn cbc_encrypt_blocks<C>(cipher: &C, iv: &[u8], data: &mut [u8])
where
    C: BlockCipher + BlockEncrypt + BlockSizeUser<BlockSize = U16> + Clone,
{
    let mut enc = cbc::Encryptor::<C>::inner_iv_init(cipher.clone(), GenericArray::from_slice(iv));
    for block in data.chunks_exact_mut(AES_BLOCK_SIZE_BYTES) {
        enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

fn cbc_decrypt_blocks<C>(cipher: &C, iv: &[u8], data: &mut [u8])
where
    C: BlockCipher + BlockDecrypt + BlockSizeUser<BlockSize = U16> + Clone,
{
    let mut dec = cbc::Decryptor::<C>::inner_iv_init(cipher.clone(), GenericArray::from_slice(iv));
    for block in data.chunks_exact_mut(AES_BLOCK_SIZE_BYTES) {
        dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

/// Encrypt whole blocks with AES-CBC. No padding is applied.
///
/// # Arguments
///
/// * `ctx` - Expanded key
/// * `iv` - 16 byte initialization vector
/// * `input` - Plaintext, a multiple of 16 bytes
/// * `output` - Ciphertext destination, at least `input.len()` bytes
pub fn aes_cbc_encrypt(
    ctx: &AesContext,
    iv: &[u8],
    input: &[u8],
    output: &mut [u8],
) -> AegisResult<()> {
    check_cbc_args(iv, input, output)?;
    let data = &mut output[..input.len()];
    data.copy_from_slice(input);
    match ctx {
        AesContext::Aes128(c) => cbc_encrypt_blocks(c, iv, data),
        AesContext::Aes256(c) => cbc_encrypt_blocks(c, iv, data),
    }
    Ok(())
}

/// Decrypt whole blocks with AES-CBC.
///
/// # Arguments
///
/// * `ctx` - Expanded key
/// * `iv` - 16 byte initialization vector
/// * `input` - Ciphertext, a multiple of 16 bytes
/// * `output` - Plaintext destination, at least `input.len()` bytes
pub fn aes_cbc_decrypt(
    ctx: &AesContext,
    iv: &[u8],
    input: &[u8],
    output: &mut [u8],
) -> AegisResult<()> {
    check_cbc_args(iv, input, output)?;
    let data = &mut output[..input.len()];
    data.copy_from_slice(input);
    match ctx {
        AesContext::Aes128(c) => cbc_decrypt_blocks(c, iv, data),
        AesContext::Aes256(c) => cbc_decrypt_blocks(c, iv, data),
    }
    Ok(())
}

/// AES-XTS (IEEE 1619) with independent data and tweak key schedules
pub struct XtsContext {
    data: AesContext,
    tweak: AesContext,
}

impl XtsContext {
    /// # Arguments
    ///
    /// * `data_key` - 16 or 32 byte data key
    /// * `tweak_key` - Tweak key of the same size
    pub fn new(data_key: &[u8], tweak_key: &[u8]) -> AegisResult<Self> {
        if data_key.len() != tweak_key.len() {
            return Err(AegisError::DRIVER_AES_INVALID_KEY_SIZE);
        }
        Ok(Self {
            data: AesContext::new(data_key)?,
            tweak: AesContext::new(tweak_key)?,
        })
    }

    /// Tweak for a sector number, encoded little-endian
    pub fn sector_tweak(sector: u64) -> [u8; AES_BLOCK_SIZE_BYTES] {
        (sector as u128).to_le_bytes()
    }

    /// Encrypt one data unit in place
    ///
    /// # Arguments
    ///
    /// * `tweak` - 16 byte sector tweak
    /// * `data` - Data unit, at least 16 bytes; a trailing partial block uses
    ///   ciphertext stealing
    pub fn encrypt_sector(
        &self,
        tweak: &[u8; AES_BLOCK_SIZE_BYTES],
        data: &mut [u8],
    ) -> AegisResult<()> {
        self.process(tweak, data, true)
    }

    /// Decrypt one data unit in place
    pub fn decrypt_sector(
        &self,
        tweak: &[u8; AES_BLOCK_SIZE_BYTES],
        data: &mut [u8],
    ) -> AegisResult<()> {
        self.process(tweak, data, false)
    }

    fn xex(&self, block: &mut [u8], t: &[u8; AES_BLOCK_SIZE_BYTES], encrypt: bool) {
        let mut x = [0u8; AES_BLOCK_SIZE_BYTES];
        for ((o, b), k) in x.iter_mut().zip(block.iter()).zip(t.iter()) {
            *o = b ^ k;
        }
        let mut y = if encrypt {
            self.data.encrypt_block(&x)
        } else {
            self.data.decrypt_block(&x)
        };
        for ((o, b), k) in block.iter_mut().zip(y.iter()).zip(t.iter()) {
            *o = b ^ k;
        }
        x.zeroize();
        y.zeroize();
    }

    fn process(
        &self,
        tweak: &[u8; AES_BLOCK_SIZE_BYTES],
        data: &mut [u8],
        encrypt: bool,
    ) -> AegisResult<()> {
        if data.len() < AES_BLOCK_SIZE_BYTES {
            return Err(AegisError::DRIVER_AES_XTS_INVALID_DATA_SIZE);
        }
        let rem = data.len() % AES_BLOCK_SIZE_BYTES;
        let full_blocks = data.len() / AES_BLOCK_SIZE_BYTES;
        // With a partial tail the last full block is handled by ciphertext stealing.
        let plain_blocks = if rem == 0 { full_blocks } else { full_blocks - 1 };

        let mut t = self.tweak.encrypt_block(tweak);
        for block in data
            .chunks_exact_mut(AES_BLOCK_SIZE_BYTES)
            .take(plain_blocks)
        {
            self.xex(block, &t, encrypt);
            gf128_mul_alpha(&mut t);
        }

        if rem != 0 {
            let last = plain_blocks * AES_BLOCK_SIZE_BYTES;
            let (head, tail) = data[last..].split_at_mut(AES_BLOCK_SIZE_BYTES);
            let mut t_next = t;
            gf128_mul_alpha(&mut t_next);
            let (first_tweak, second_tweak) = if encrypt { (&t, &t_next) } else { (&t_next, &t) };

            let mut cc = [0u8; AES_BLOCK_SIZE_BYTES];
            cc.copy_from_slice(head);
            self.xex(&mut cc, first_tweak, encrypt);

            let mut pp = cc;
            pp[..rem].copy_from_slice(tail);
            tail.copy_from_slice(&cc[..rem]);
            self.xex(&mut pp, second_tweak, encrypt);
            head.copy_from_slice(&pp);

            cc.zeroize();
            pp.zeroize();
            t_next.zeroize();
        }
        t.zeroize();
        Ok(())
    }
}

/// Multiply a tweak by the primitive element alpha in GF(2^128), little-endian
fn gf128_mul_alpha(t: &mut [u8; AES_BLOCK_SIZE_BYTES]) {
    let mut carry = 0u8;
    for b in t.iter_mut() {
        let next = *b >> 7;
        *b = (*b << 1) | carry;
        carry = next;
    }
    if carry != 0 {
        t[0] ^= 0x87;
    }
}
