//! Streaming XChaCha20 over async readers
//!
//! The nonce is a fixed all-zero value, so a key must never encrypt more than
//! one stream. Every stored object gets its own freshly generated key.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use chacha20::XChaCha20;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use tokio::io::{AsyncRead, ReadBuf};

use crate::keys::EncryptionKey;

const NONCE: [u8; 24] = [0u8; 24];

/// Applies the keystream to bytes as they are read
///
/// Encryption and decryption are the same operation.
pub struct CipherReader<R> {
    inner: R,
    cipher: XChaCha20,
}

impl<R> CipherReader<R> {
    pub fn new(key: &EncryptionKey, inner: R) -> Self {
        Self {
            inner,
            cipher: XChaCha20::new(key.as_bytes().into(), &NONCE.into()),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CipherReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let start = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        this.cipher.apply_keystream(&mut buf.filled_mut()[start..]);
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn run(key: &EncryptionKey, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        CipherReader::new(key, data).read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_decrypt_inverts_encrypt() {
        let key = EncryptionKey::generate();
        let plaintext = b"streamed plaintext that spans a few cipher blocks of data".repeat(10);

        let ciphertext = run(&key, &plaintext).await;
        assert_ne!(ciphertext, plaintext);
        assert_eq!(run(&key, &ciphertext).await, plaintext);
    }

    #[tokio::test]
    async fn test_small_reads_match_bulk() {
        let key = EncryptionKey::from_bytes(&[9u8; 32]).unwrap();
        let plaintext = vec![0xabu8; 300];
        let bulk = run(&key, &plaintext).await;

        let mut reader = CipherReader::new(&key, plaintext.as_slice());
        let mut chunked = Vec::new();
        let mut chunk = [0u8; 7];
        loop {
            let n = reader.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            chunked.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(chunked, bulk);
    }

    #[tokio::test]
    async fn test_keys_produce_distinct_streams() {
        let plaintext = [0u8; 64];
        let a = run(&EncryptionKey::generate(), &plaintext).await;
        let b = run(&EncryptionKey::generate(), &plaintext).await;
        assert_ne!(a, b);
    }
}
