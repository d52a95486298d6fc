// LDK-to-LND watchtower bridge
// Written in 2024 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! Error taxonomy for the bridge. Each component gets its own enum; they
//! compose into [`BridgeError`] so the delivery pipeline can propagate any
//! of them without manual matching at every call site.

use amplify::IoError;

/// Startup-time configuration problems. Surfaced immediately; the bridge
/// never starts with one of these outstanding.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum ConfigError {
    /// tower URI `{0}` is not of the form `<hex pubkey>@<host>:<port>`
    MalformedTowerUri(String),

    /// sweep address `{0}` could not be parsed as bech32 or base58
    MalformedSweepAddress(String),

    /// unknown transport mode `{0}`, expected `onion` or `tcp`
    UnknownTransport(String),

    /// local static key material is missing or invalid
    MissingStaticKey,

    /// failed to read configuration file
    #[from(std::io::Error)]
    #[display(inner)]
    Io(IoError),

    /// failed to parse configuration file: {0}
    #[cfg(feature = "config")]
    Parse(String),
}

/// A `CommitmentRecord` rejected by the justice capture layer or the
/// JusticeKit builder: malformed fields, invalid pubkey prefixes, or a CSV
/// delay that could not be recovered by brute force.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum CaptureError {
    /// field `{field}` has length {actual}, expected {expected}
    WrongFieldLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// compressed pubkey must start with 0x02 or 0x03, got {0:#04x}
    InvalidPubkeyPrefix(u8),

    /// sweep output length {0} exceeds the 34-byte maximum
    SweepTooLong(usize),

    /// no candidate CSV delay in the scanned range matched the to-local
    /// witness script for commitment {0}
    CsvDelayNotFound(u64),

    /// commitment {0} is missing its justice signatures
    IncompleteRecord(u64),
}

/// AEAD failures: tag mismatch, pubkey decompression failure, nonce
/// overflow. Fatal within a handshake or a decrypted frame.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum CryptoError {
    /// authentication tag did not verify
    AuthFailure,

    /// handshake authentication failed
    HandshakeAuth,

    /// nonce counter would overflow before the next scheduled rotation
    NonceOverflow,

    /// failed to decompress a secp256k1 point
    PointDecompression,

    /// plaintext length {0} is not the expected {1} bytes
    WrongPlaintextLength(usize, usize),
}

/// Connect/bootstrap/read/write failures at the transport layer.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum TransportFailure {
    /// failed to connect to {0}
    ConnectFailed(String),

    /// Tor bootstrap failed: {0}
    TorBootstrap(String),

    /// read/write timed out after {0:?}
    Timeout(std::time::Duration),

    /// the underlying socket was closed
    ConnectionClosed,

    /// length prefix {0} exceeds the 65535-byte frame maximum
    FrameTooLarge(usize),

    /// I/O error
    #[from]
    #[display(inner)]
    Io(IoError),
}

/// Tower-side protocol violations: undefined status codes, non-monotone
/// acks, feature-bit mismatches.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ProtocolError {
    /// chain_hash mismatch with the tower
    ChainHashMismatch,

    /// tower requires an unsupported (even) feature bit {0}
    RequiredFeatureUnsupported(u16),

    /// tower replied with undefined status code {0}
    UndefinedStatus(u8),

    /// `last_applied` moved backwards from {prev} to {next}
    NonMonotoneAck { prev: u16, next: u16 },

    /// received a message before the session's Init exchange completed
    InitNotExchanged,

    /// tower is at capacity for this session (status 40)
    TemporaryFailure,

    /// tower rejected the session parameters (status 41)
    PermanentFailure,

    /// initiator has fallen behind the tower's view and must resync
    ClientBehind,

    /// session has reached `max_updates` and must be recreated
    SessionConsumed,

    /// malformed message on the wire: {0}
    MalformedMessage(String),
}

/// Aggregate error returned by the delivery pipeline, composing every
/// component error so a single `?` chain can cross component boundaries.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum BridgeError {
    /// {0}
    #[from]
    Config(ConfigError),

    /// {0}
    #[from]
    Capture(CaptureError),

    /// {0}
    #[from]
    Crypto(CryptoError),

    /// {0}
    #[from]
    Transport(TransportFailure),

    /// {0}
    #[from]
    Protocol(ProtocolError),

    /// local blob store error: {0}
    LocalStore(String),
}

/// Process exit status for an embedding binary: 0 on clean shutdown, a
/// distinct non-zero code per failure category so an operator's process
/// supervisor can tell a bad config apart from a tower that refuses to
/// speak Brontide at all.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum BridgeExitCode {
    Ok = 0,
    ConfigError = 1,
    CryptoIncompatibility = 2,
    TransportFailure = 3,
}

impl BridgeExitCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<BridgeExitCode> for std::process::ExitCode {
    fn from(code: BridgeExitCode) -> Self {
        std::process::ExitCode::from(code.code())
    }
}

impl From<&BridgeError> for BridgeExitCode {
    /// A handshake that never completes is reported through
    /// [`CryptoError::HandshakeAuth`] or [`TransportFailure::Timeout`]
    /// during the handshake phase; both collapse to
    /// `CryptoIncompatibility` here since the embedding application cannot
    /// otherwise distinguish "wrong key" from "peer never responded" any
    /// more precisely than the wire protocol itself can.
    fn from(error: &BridgeError) -> Self {
        match error {
            BridgeError::Config(_) => BridgeExitCode::ConfigError,
            BridgeError::Crypto(_) => BridgeExitCode::CryptoIncompatibility,
            BridgeError::Transport(_) => BridgeExitCode::TransportFailure,
            BridgeError::Capture(_) | BridgeError::Protocol(_) | BridgeError::LocalStore(_) => {
                BridgeExitCode::TransportFailure
            }
        }
    }
}
