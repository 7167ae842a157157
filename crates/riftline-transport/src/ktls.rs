//! Kernel TLS (kTLS) offload activation.
//!
//! This hand-rolls the two `setsockopt` calls the kernel's `tls` ULP
//! requires (`TCP_ULP=tls` then `SOL_TLS`/`TLS_TX`+`TLS_RX` with the
//! negotiated traffic secrets) rather than depending on the `ktls` crate,
//! whose public API assumes a tokio runtime that this single-threaded
//! non-blocking event loop does not run. The traffic secrets come out of
//! `rustls`'s `secret_extraction` feature (`dangerous_extract_secrets`),
//! which is the same mechanism that crate uses internally. This follows the
//! reference crate's own precedent of reaching for raw `libc::setsockopt`
//! directly when no crate wraps the option it needs.
//!
//! Linux-only: kTLS is a Linux kernel feature with no equivalent elsewhere.

use std::os::fd::RawFd;

use rustls::ConnectionTrafficSecrets;

// Not (yet, consistently) exposed by the `libc` crate across all targets;
// these are the stable kernel ABI values from `linux/tls.h`.
const SOL_TLS: libc::c_int = 282;
const TCP_ULP: libc::c_int = 31;
const TLS_TX: libc::c_int = 1;
const TLS_RX: libc::c_int = 2;

const TLS_1_2_VERSION: u16 = (3 << 8) | 3;
const TLS_1_3_VERSION: u16 = (3 << 8) | 4;

const TLS_CIPHER_AES_GCM_128: u16 = 51;
const TLS_CIPHER_AES_GCM_256: u16 = 52;
const TLS_CIPHER_CHACHA20_POLY1305: u16 = 54;

#[repr(C)]
struct CryptoInfoHeader {
    version: u16,
    cipher_type: u16,
}

/// Fixed-capacity crypto_info payload big enough for any of the three
/// ciphers this module supports (AES-256-GCM is the largest: 12+32+4+8).
#[repr(C)]
struct CryptoInfo {
    header: CryptoInfoHeader,
    bytes: [u8; 12 + 32 + 4 + 8],
    len: usize,
}

fn encode(version: u16, cipher_type: u16, iv: &[u8], key: &[u8], salt: &[u8], rec_seq: u64) -> CryptoInfo {
    let mut info = CryptoInfo {
        header: CryptoInfoHeader { version, cipher_type },
        bytes: [0u8; 12 + 32 + 4 + 8],
        len: 0,
    };
    let mut at = 0;
    for part in [iv, key, salt, &rec_seq.to_be_bytes()] {
        info.bytes[at..at + part.len()].copy_from_slice(part);
        at += part.len();
    }
    info.len = at;
    info
}

fn crypto_info_for(secrets: &ConnectionTrafficSecrets, seq: u64, tls13: bool) -> Option<CryptoInfo> {
    let version = if tls13 { TLS_1_3_VERSION } else { TLS_1_2_VERSION };
    match secrets {
        ConnectionTrafficSecrets::Aes128Gcm { key, iv } => {
            Some(encode(version, TLS_CIPHER_AES_GCM_128, &iv.as_ref()[4..], key.as_ref(), &iv.as_ref()[..4], seq))
        }
        ConnectionTrafficSecrets::Aes256Gcm { key, iv } => {
            Some(encode(version, TLS_CIPHER_AES_GCM_256, &iv.as_ref()[4..], key.as_ref(), &iv.as_ref()[..4], seq))
        }
        ConnectionTrafficSecrets::Chacha20Poly1305 { key, iv } => {
            Some(encode(version, TLS_CIPHER_CHACHA20_POLY1305, iv.as_ref(), key.as_ref(), &[], seq))
        }
        _ => None,
    }
}

fn apply(fd: RawFd, direction: libc::c_int, info: &CryptoInfo) -> bool {
    let size = core::mem::size_of::<CryptoInfoHeader>() + info.len;
    let ret = unsafe {
        libc::setsockopt(fd, SOL_TLS, direction, (&raw const info.header).cast(), size as libc::socklen_t)
    };
    ret == 0
}

/// Attempts to switch `fd` into kernel-offload mode using the extracted
/// traffic secrets. Returns `true` only if both the TX and RX directions
/// activated; on any partial failure the socket is left in an indeterminate
/// state for kTLS purposes and the caller must not continue trying to use
/// it for kernel-offloaded I/O (it should already have stopped using
/// userspace `rustls` once the secrets were extracted, so a partial failure
/// here is treated as fatal by the caller).
#[cfg(target_os = "linux")]
pub fn activate(
    fd: RawFd,
    tx: (u64, &ConnectionTrafficSecrets),
    rx: (u64, &ConnectionTrafficSecrets),
    tls13: bool,
) -> bool {
    let tag = c"tls";
    let ret = unsafe {
        libc::setsockopt(fd, libc::IPPROTO_TCP, TCP_ULP, tag.as_ptr().cast(), 4)
    };
    if ret != 0 {
        return false;
    }

    let (Some(tx_info), Some(rx_info)) =
        (crypto_info_for(tx.1, tx.0, tls13), crypto_info_for(rx.1, rx.0, tls13))
    else {
        return false;
    };

    apply(fd, TLS_TX, &tx_info) && apply(fd, TLS_RX, &rx_info)
}

#[cfg(not(target_os = "linux"))]
pub fn activate(
    _fd: RawFd,
    _tx: (u64, &ConnectionTrafficSecrets),
    _rx: (u64, &ConnectionTrafficSecrets),
    _tls13: bool,
) -> bool {
    false
}
