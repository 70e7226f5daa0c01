// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Authentication sub-machines: standard VNC-DES and Apple Remote Desktop
//! (Diffie-Hellman + AES-128-ECB).

use aes::Aes128;
use cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use des::Des;
use num_bigint::BigUint;
use rand::RngCore;

/// Mangles an 8-byte VNC password into a DES key by reversing the bit
/// order of every byte (bit `i` becomes bit `7-i`). This is a deliberate
/// quirk of the original RFB auth scheme, not a cryptographic strengthening
/// step — see RFC 6143 §7.2.2.
///
/// The password is truncated or NUL-padded to exactly 8 bytes first.
#[must_use]
pub fn vnc_des_key(password: &str) -> [u8; 8] {
    let mut padded = [0u8; 8];
    let bytes = password.as_bytes();
    let n = bytes.len().min(8);
    padded[..n].copy_from_slice(&bytes[..n]);

    let mut key = [0u8; 8];
    for (i, &byte) in padded.iter().enumerate() {
        let mut reversed = 0u8;
        for bit in 0..8 {
            if byte & (1 << bit) != 0 {
                reversed |= 0x80 >> bit;
            }
        }
        key[i] = reversed;
    }
    key
}

/// Encrypts a 16-byte VNC-DES challenge with `password`, returning the
/// 16-byte response the server expects: two independent DES-ECB blocks
/// using the bit-reversed password key.
///
/// # Panics
///
/// Panics if `challenge` is not exactly 16 bytes; callers only ever invoke
/// this with a challenge read straight off the wire, which is always 16
/// bytes per RFC 6143 §7.2.2.
#[must_use]
pub fn vnc_des_response(password: &str, challenge: &[u8]) -> Vec<u8> {
    assert_eq!(challenge.len(), 16, "VNC-DES challenge must be 16 bytes");
    let key = vnc_des_key(password);
    let cipher = Des::new(GenericArray::from_slice(&key));

    let mut response = Vec::with_capacity(16);
    for block in challenge.chunks_exact(8) {
        let mut buf = GenericArray::clone_from_slice(block);
        cipher.encrypt_block(&mut buf);
        response.extend_from_slice(&buf);
    }
    response
}

/// Left-pads `value`'s big-endian bytes with zeros to exactly `len` bytes.
///
/// This is the step the reference implementation's `long_to_bytes` skips:
/// a modpow result whose natural big-endian encoding is shorter than the
/// modulus must still occupy the full declared length, or the MD5 digest
/// taken over it will not match what the server computed.
#[must_use]
pub fn left_pad(value: &BigUint, len: usize) -> Vec<u8> {
    let raw = value.to_bytes_be();
    if raw.len() >= len {
        return raw[raw.len() - len..].to_vec();
    }
    let mut padded = vec![0u8; len - raw.len()];
    padded.extend_from_slice(&raw);
    padded
}

/// Output of the Apple Remote Desktop Diffie-Hellman exchange: the
/// client's public key and the AES key derived from the shared secret.
pub struct ArdKeyExchange {
    pub public_key: Vec<u8>,
    pub key_digest: [u8; 16],
}

/// Performs the ARD DH exchange given the server's `generator`, `modulus`,
/// and `server_public` key (all as received on the wire; `modulus` and
/// `server_public` are each `key_len` bytes).
///
/// Generates a 512-byte random secret exponent, as the protocol requires,
/// computes `pub = generator^secret mod modulus` and
/// `shared = server_public^secret mod modulus`, left-pads both to
/// `key_len`, and MD5-digests the padded shared secret to form the AES key.
#[must_use]
pub fn ard_key_exchange(generator: u16, modulus: &[u8], server_public: &[u8]) -> ArdKeyExchange {
    let key_len = modulus.len();
    let mut secret_bytes = vec![0u8; 512];
    rand::thread_rng().fill_bytes(&mut secret_bytes);

    let g = BigUint::from(generator);
    let m = BigUint::from_bytes_be(modulus);
    let server_pub = BigUint::from_bytes_be(server_public);
    let s = BigUint::from_bytes_be(&secret_bytes);

    let public_key = left_pad(&g.modpow(&s, &m), key_len);
    let shared = left_pad(&server_pub.modpow(&s, &m), key_len);

    let digest = md5::compute(&shared);
    ArdKeyExchange {
        public_key,
        key_digest: digest.0,
    }
}

/// Encrypts the ARD credential block (`username` and `password`, each
/// NUL-padded to 64 bytes, concatenated) with AES-128-ECB using
/// `key_digest`.
#[must_use]
pub fn ard_encrypt_credentials(key_digest: &[u8; 16], username: &str, password: &str) -> Vec<u8> {
    let mut plaintext = [0u8; 128];
    let user_bytes = username.as_bytes();
    let pass_bytes = password.as_bytes();
    let ulen = user_bytes.len().min(64);
    let plen = pass_bytes.len().min(64);
    plaintext[..ulen].copy_from_slice(&user_bytes[..ulen]);
    plaintext[64..64 + plen].copy_from_slice(&pass_bytes[..plen]);

    let cipher = Aes128::new(GenericArray::from_slice(key_digest));
    let mut out = Vec::with_capacity(128);
    for block in plaintext.chunks_exact(16) {
        let mut buf = GenericArray::clone_from_slice(block);
        cipher.encrypt_block(&mut buf);
        out.extend_from_slice(&buf);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6143-style interoperability vector: password "password", key
    // mangles to the bit-reversed bytes used by every VNC client/server.
    #[test]
    fn vnc_des_key_bit_reversal_vector() {
        let key = vnc_des_key("password");
        assert_eq!(key, [0x0E, 0x86, 0xCE, 0xCE, 0xEE, 0xF6, 0x4E, 0x26]);
    }

    #[test]
    fn vnc_des_key_pads_short_password() {
        let key = vnc_des_key("ab");
        // 'a' = 0x61 = 0b0110_0001 reversed -> 0b1000_0110 = 0x86
        // 'b' = 0x62 = 0b0110_0010 reversed -> 0b0100_0110 = 0x46
        assert_eq!(key[0], 0x86);
        assert_eq!(key[1], 0x46);
        assert_eq!(&key[2..], &[0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn vnc_des_response_is_16_bytes() {
        let challenge = [0u8; 16];
        let response = vnc_des_response("password", &challenge);
        assert_eq!(response.len(), 16);
    }

    #[test]
    fn left_pad_preserves_declared_length() {
        let value = BigUint::from(1u32);
        let padded = left_pad(&value, 8);
        assert_eq!(padded, vec![0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn left_pad_truncates_longer_values_from_the_front() {
        let value = BigUint::from(0x0102_0304u32);
        let padded = left_pad(&value, 2);
        assert_eq!(padded, vec![0x03, 0x04]);
    }
}
