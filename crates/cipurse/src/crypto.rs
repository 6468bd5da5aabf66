//! Cryptographic primitives for the CIPURSE secure channel
//!
//! This module holds the key agreement used during mutual authentication
//! (the non-linear mapping `NLM`, the `k0` derivation and the cryptograms),
//! the session MAC key derivation, and the AES primitives used by secure
//! messaging.

use aes::Aes128;
use cbc_mac::{CbcMac, Mac};
use cipher::{
    BlockDecryptMut, BlockEncrypt, BlockEncryptMut, Iv, IvSizeUser, Key, KeyInit, KeyIvInit,
    KeySizeUser, block_padding::Iso7816, consts::U16, generic_array::GenericArray,
};
use subtle::ConstantTimeEq;

use crate::constants::{MAC_LEN, SMALL_RANDOM_LEN};

/// AES-128 key
pub type AesKey = [u8; 16];
/// Single AES block
pub type AesBlock = [u8; 16];
/// 16-byte random (`RP` on the card side, `RQ` on the host side)
pub type Random = [u8; 16];
/// 6-byte random (`rP` on the card side, `rQ` on the host side)
pub type SmallRandom = [u8; SMALL_RANDOM_LEN];
/// Truncated secure messaging MAC
pub type FrameMac = [u8; MAC_LEN];

type Encryptor = cbc::Encryptor<Aes128>;
type Decryptor = cbc::Decryptor<Aes128>;

/// Irreducible polynomial of the GF(2^48) field used by the non-linear mapping
const NLM_POLYNOMIAL: u64 = 0x35B0_88CC_E172;
const MASK_48: u64 = (1 << 48) - 1;

/// Placeholder struct for defining CIPURSE cryptographic parameters
#[allow(missing_debug_implementations)]
pub struct Cipurse;

impl KeySizeUser for Cipurse {
    type KeySize = U16;
}

impl IvSizeUser for Cipurse {
    type IvSize = U16;
}

/// Encrypt a single block with AES-128 (ECB, one block)
pub(crate) fn aes_encrypt(key: &AesKey, block: &AesBlock) -> AesBlock {
    let cipher = Aes128::new(Key::<Cipurse>::from_slice(key));
    let mut out = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut out);
    out.into()
}

fn xor(a: &AesBlock, b: &AesBlock) -> AesBlock {
    let mut out = *a;
    out.iter_mut().zip(b.iter()).for_each(|(o, b)| *o ^= b);
    out
}

const fn rotate_left_48(x: u64) -> u64 {
    let shifted = x << 1;
    if shifted & (1 << 48) != 0 {
        (shifted | 1) & MASK_48
    } else {
        shifted
    }
}

fn read_48(bytes: &SmallRandom) -> u64 {
    bytes.iter().fold(0, |acc, b| (acc << 8) | u64::from(*b))
}

fn write_48(value: u64) -> SmallRandom {
    let be = value.to_be_bytes();
    let mut out = [0u8; SMALL_RANDOM_LEN];
    out.copy_from_slice(&be[2..]);
    out
}

/// Non-linear mapping of two 48-bit values over GF(2^48)
pub(crate) fn nlm(x: &SmallRandom, y: &SmallRandom) -> SmallRandom {
    let x = read_48(x);
    let mut y = read_48(y);
    let mut r = 0u64;

    for _ in 0..48 {
        r = rotate_left_48(r);
        if r & 1 == 1 {
            r ^= NLM_POLYNOMIAL;
        }
        y = rotate_left_48(y);
        if y & 1 == 1 {
            r ^= x;
        }
    }

    write_48(r & MASK_48)
}

/// Rightmost 48 bits of the long-term key
fn extract_48(key: &AesKey) -> SmallRandom {
    let mut out = [0u8; SMALL_RANDOM_LEN];
    out.copy_from_slice(&key[key.len() - SMALL_RANDOM_LEN..]);
    out
}

/// Derive the intermediate key `k0` from the long-term key and both small randoms.
///
/// `kP = NLM(EXT(K), rP)`, then `k0 = AES_{PAD2(kP) xor PAD(rQ)}(K) xor K`.
pub(crate) fn derive_k0(key: &AesKey, card_small: &SmallRandom, host_small: &SmallRandom) -> AesKey {
    let kp = nlm(&extract_48(key), card_small);

    let mut session = [0u8; 16];
    session[..SMALL_RANDOM_LEN].copy_from_slice(&kp);
    session[SMALL_RANDOM_LEN..2 * SMALL_RANDOM_LEN].copy_from_slice(&kp);
    session
        .iter_mut()
        .zip(host_small.iter())
        .for_each(|(s, r)| *s ^= r);

    xor(&aes_encrypt(&session, key), key)
}

/// Host cryptogram `cP = AES_k0(RP)`
pub(crate) fn host_cryptogram(k0: &AesKey, card_random: &Random) -> AesBlock {
    aes_encrypt(k0, card_random)
}

/// Card cryptogram `cT = AES_k0(RQ)`
pub(crate) fn card_cryptogram(k0: &AesKey, host_random: &Random) -> AesBlock {
    aes_encrypt(k0, host_random)
}

/// Session MAC key `k1 = AES_RP(k0 xor RQ) xor (k0 xor RQ)`
pub(crate) fn derive_mac_key(k0: &AesKey, card_random: &Random, host_random: &Random) -> AesKey {
    let mixed = xor(k0, host_random);
    xor(&aes_encrypt(card_random, &mixed), &mixed)
}

/// Compare two cryptograms in constant time
pub(crate) fn cryptograms_match(expected: &[u8], actual: &[u8]) -> bool {
    expected.ct_eq(actual).into()
}

/// Encode the send sequence counter as a big-endian AES block
pub(crate) fn ssc_block(ssc: u64) -> AesBlock {
    let mut block = [0u8; 16];
    block[8..].copy_from_slice(&ssc.to_be_bytes());
    block
}

/// Append ISO 7816-4 padding (`80 00 ..`) up to the next block boundary
fn pad_iso7816(buf: &mut Vec<u8>) {
    buf.push(0x80);
    while buf.len() % 16 != 0 {
        buf.push(0x00);
    }
}

/// Compute the truncated AES CBC-MAC over `SSC || parts..`.
pub(crate) fn calculate_mac(mac_key: &AesKey, ssc: u64, parts: &[&[u8]]) -> FrameMac {
    let mut buf = Vec::with_capacity(16 + parts.iter().map(|p| p.len()).sum::<usize>() + 16);
    buf.extend_from_slice(&ssc_block(ssc));
    for part in parts {
        buf.extend_from_slice(part);
    }
    pad_iso7816(&mut buf);

    let mut mac = <CbcMac<Aes128> as Mac>::new(Key::<Cipurse>::from_slice(mac_key));
    mac.update(&buf);
    let full = mac.finalize().into_bytes();

    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&full[..MAC_LEN]);
    out
}

/// Verify a received MAC in constant time
pub(crate) fn verify_mac(mac_key: &AesKey, ssc: u64, parts: &[&[u8]], received: &[u8]) -> bool {
    cryptograms_match(&calculate_mac(mac_key, ssc, parts), received)
}

fn frame_iv(enc_key: &AesKey, ssc: u64) -> Iv<Cipurse> {
    GenericArray::from(aes_encrypt(enc_key, &ssc_block(ssc)))
}

/// Encrypt frame data with AES-128-CBC and ISO 7816-4 padding.
///
/// The IV is the encryption of the frame's sequence counter under the
/// session encryption key.
pub(crate) fn encrypt_data(enc_key: &AesKey, ssc: u64, data: &[u8]) -> Vec<u8> {
    let iv = frame_iv(enc_key, ssc);
    Encryptor::new(Key::<Cipurse>::from_slice(enc_key), &iv).encrypt_padded_vec_mut::<Iso7816>(data)
}

/// Decrypt frame data and strip the ISO 7816-4 padding.
///
/// Returns `None` if the ciphertext is not block aligned or the padding is malformed.
pub(crate) fn decrypt_data(enc_key: &AesKey, ssc: u64, ciphertext: &[u8]) -> Option<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return None;
    }
    let iv = frame_iv(enc_key, ssc);
    Decryptor::new(Key::<Cipurse>::from_slice(enc_key), &iv)
        .decrypt_padded_vec_mut::<Iso7816>(ciphertext)
        .ok()
}
