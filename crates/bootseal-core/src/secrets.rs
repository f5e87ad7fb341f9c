//! Per-build secret keys, IVs and the readback password
//!
//! Secrets are generated once per build, persisted as C preprocessor
//! defines so the bootloader can `#include` them, and read back by every
//! host tool that needs them:
//!
//! ```text
//! #define FW_KEY "\x3a\x91...\x0c"
//! #define FW_IV "\x55\x07...\xe1"
//! ```
//!
//! Every value is written as `\xHH` escapes, two lower-case hex digits per
//! byte, with no separators.
//!
//! # Concurrency
//!
//! The secret file has exactly one writer (`secrets generate`) and many
//! independent readers. Nothing locks it: callers must not load a secret
//! file while it is being written. A missing file is reported as
//! [`SecretsError::NotFound`] and never retried.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Write as _;

use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroizing;

/// Name of one entry in the secret set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyName {
    /// Firmware bundle encryption key
    FwKey,
    /// Readback request/response encryption key
    RbKey,
    /// Firmware bundle and flash hash tag key
    HKey,
    /// Readback request tag key
    RbhKey,
    /// Bootloader self-verification key (burned into the target only)
    VerifyKey,
    /// Firmware bundle IV
    FwIv,
    /// Readback IV
    RbIv,
    /// Readback password
    RbPw,
}

impl KeyName {
    /// Number of entries in a secret set
    pub const COUNT: usize = 8;

    /// Every key name, in persisted order
    pub const ALL: [KeyName; Self::COUNT] = [
        KeyName::FwKey,
        KeyName::RbKey,
        KeyName::HKey,
        KeyName::RbhKey,
        KeyName::VerifyKey,
        KeyName::FwIv,
        KeyName::RbIv,
        KeyName::RbPw,
    ];

    /// Name used in the secret file and in the bootloader sources
    pub const fn as_str(self) -> &'static str {
        match self {
            KeyName::FwKey => "FW_KEY",
            KeyName::RbKey => "RB_KEY",
            KeyName::HKey => "H_KEY",
            KeyName::RbhKey => "RBH_KEY",
            KeyName::VerifyKey => "VERIFY_KEY",
            KeyName::FwIv => "FW_IV",
            KeyName::RbIv => "RB_IV",
            KeyName::RbPw => "RB_PW",
        }
    }

    /// Required length of the value in bytes
    pub const fn size(self) -> usize {
        match self {
            KeyName::FwKey
            | KeyName::RbKey
            | KeyName::HKey
            | KeyName::RbhKey
            | KeyName::VerifyKey => 32,
            KeyName::FwIv | KeyName::RbIv => 16,
            KeyName::RbPw => 24,
        }
    }

    /// Look up a key by its persisted name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from generating, parsing or storing a secret set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretsError {
    /// A line is not of the form `#define NAME "value"`
    Malformed {
        /// 1-based line number
        line: usize,
        /// What was wrong with the line
        reason: &'static str,
    },
    /// A line names a key outside the enumerated set
    UnknownKey {
        /// 1-based line number
        line: usize,
    },
    /// The same key appears twice
    DuplicateKey(KeyName),
    /// A key is absent
    MissingKey(KeyName),
    /// A key has the wrong number of bytes
    BadLength {
        /// Offending key
        key: KeyName,
        /// Required length
        expected: usize,
        /// Length found
        actual: usize,
    },
    /// The OS entropy source failed
    EntropyUnavailable,
    /// The secret file does not exist
    NotFound,
    /// Reading or writing the secret file failed
    IoError,
}

impl fmt::Display for SecretsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { line, reason } => {
                write!(f, "malformed secrets, line {}: {}", line, reason)
            }
            Self::UnknownKey { line } => write!(f, "unknown key name on line {}", line),
            Self::DuplicateKey(key) => write!(f, "duplicate key {}", key),
            Self::MissingKey(key) => write!(f, "missing key {}", key),
            Self::BadLength {
                key,
                expected,
                actual,
            } => write!(
                f,
                "key {} must be {} bytes, found {}",
                key, expected, actual
            ),
            Self::EntropyUnavailable => write!(f, "entropy source unavailable"),
            Self::NotFound => write!(f, "secret file not found"),
            Self::IoError => write!(f, "I/O error on secret file"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SecretsError {}

/// A complete set of build secrets
///
/// Every [`KeyName`] is always present with its required length. Values are
/// wiped from memory when the set is dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKeySet {
    values: [Zeroizing<Vec<u8>>; KeyName::COUNT],
}

impl SecretKeySet {
    /// Build a set from explicit values
    ///
    /// Fails unless every key appears exactly once with the right length.
    pub fn from_entries<I>(entries: I) -> Result<Self, SecretsError>
    where
        I: IntoIterator<Item = (KeyName, Vec<u8>)>,
    {
        let mut slots: [Option<Zeroizing<Vec<u8>>>; KeyName::COUNT] = Default::default();

        for (key, value) in entries {
            let value = Zeroizing::new(value);
            if value.len() != key.size() {
                return Err(SecretsError::BadLength {
                    key,
                    expected: key.size(),
                    actual: value.len(),
                });
            }
            let slot = &mut slots[key.index()];
            if slot.is_some() {
                return Err(SecretsError::DuplicateKey(key));
            }
            *slot = Some(value);
        }

        let mut values: [Zeroizing<Vec<u8>>; KeyName::COUNT] = Default::default();
        for key in KeyName::ALL {
            values[key.index()] = slots[key.index()]
                .take()
                .ok_or(SecretsError::MissingKey(key))?;
        }

        Ok(Self { values })
    }

    /// Draw a fresh set from a cryptographically secure RNG
    pub fn try_generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, SecretsError> {
        let mut values: [Zeroizing<Vec<u8>>; KeyName::COUNT] = Default::default();
        for key in KeyName::ALL {
            let mut value = Zeroizing::new(vec![0u8; key.size()]);
            rng.try_fill_bytes(&mut value)
                .map_err(|_| SecretsError::EntropyUnavailable)?;
            values[key.index()] = value;
        }
        Ok(Self { values })
    }

    /// Draw a fresh set from the operating system's entropy source
    #[cfg(feature = "std")]
    pub fn generate() -> Result<Self, SecretsError> {
        let set = Self::try_generate_with(&mut rand::rngs::OsRng)?;
        log::debug!("Generated {} secrets", KeyName::COUNT);
        Ok(set)
    }

    /// Get the value stored under `key`
    pub fn get(&self, key: KeyName) -> &[u8] {
        &self.values[key.index()]
    }

    /// Iterate over every entry in persisted order
    pub fn iter(&self) -> impl Iterator<Item = (KeyName, &[u8])> {
        KeyName::ALL.into_iter().map(move |k| (k, self.get(k)))
    }

    /// Derive the field-configuration secret set from this build set
    ///
    /// Field secrets are currently a verbatim copy. Keeping them a distinct
    /// value separates the manufacturing trust boundary from the field
    /// operator's and leaves room for per-device rekeying.
    pub fn promote(&self) -> Self {
        self.clone()
    }

    /// Render the set in the persisted `#define` format
    pub fn to_c_defines(&self) -> Zeroizing<String> {
        let mut out = Zeroizing::new(String::new());
        for (key, value) in self.iter() {
            out.push_str("#define ");
            out.push_str(key.as_str());
            out.push_str(" \"");
            for byte in value {
                // Writing into a String cannot fail
                let _ = write!(out, "\\x{:02x}", byte);
            }
            out.push_str("\"\n");
        }
        out
    }

    /// Parse the persisted `#define` format
    ///
    /// The upper-case `#DEFINE` spelling written by older build scripts is
    /// accepted. Blank lines are ignored.
    pub fn parse(content: &str) -> Result<Self, SecretsError> {
        let mut entries = Vec::with_capacity(KeyName::COUNT);

        for (idx, raw) in content.lines().enumerate() {
            let line = idx + 1;
            let text = raw.trim();
            if text.is_empty() {
                continue;
            }

            let mut tokens = text.split_whitespace();
            let (directive, name, value) = match (tokens.next(), tokens.next(), tokens.next()) {
                (Some(d), Some(n), Some(v)) if tokens.next().is_none() => (d, n, v),
                _ => {
                    return Err(SecretsError::Malformed {
                        line,
                        reason: "expected three tokens",
                    })
                }
            };

            if !directive.eq_ignore_ascii_case("#define") {
                return Err(SecretsError::Malformed {
                    line,
                    reason: "expected #define",
                });
            }

            let key = KeyName::from_name(name).ok_or(SecretsError::UnknownKey { line })?;

            let quoted = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .ok_or(SecretsError::Malformed {
                    line,
                    reason: "value is not a quoted string",
                })?;

            entries.push((key, decode_escaped(quoted, line)?));
        }

        Self::from_entries(entries)
    }

    /// Write the set to `path`, replacing any existing file
    #[cfg(feature = "std")]
    pub fn persist(&self, path: impl AsRef<std::path::Path>) -> Result<(), SecretsError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_c_defines().as_bytes()).map_err(io_error)?;
        log::info!("Wrote {} secrets to {}", KeyName::COUNT, path.display());
        Ok(())
    }

    /// Load a set previously written by [`SecretKeySet::persist`]
    ///
    /// Precondition: no writer is active on `path` (see module docs).
    #[cfg(feature = "std")]
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, SecretsError> {
        let path = path.as_ref();
        let content = Zeroizing::new(std::fs::read_to_string(path).map_err(io_error)?);
        let set = Self::parse(&content)?;
        log::debug!("Loaded secrets from {}", path.display());
        Ok(set)
    }
}

impl fmt::Debug for SecretKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_map();
        for key in KeyName::ALL {
            list.entry(&key.as_str(), &"<redacted>");
        }
        list.finish()
    }
}

/// Copy the build secret file verbatim to the field-configuration file
///
/// The source is parsed first so a corrupt build file is never promoted.
#[cfg(feature = "std")]
pub fn promote_file(
    build: impl AsRef<std::path::Path>,
    field: impl AsRef<std::path::Path>,
) -> Result<(), SecretsError> {
    let (build, field) = (build.as_ref(), field.as_ref());
    SecretKeySet::load(build)?;
    std::fs::copy(build, field).map_err(io_error)?;
    log::info!(
        "Promoted build secrets {} to field secrets {}",
        build.display(),
        field.display()
    );
    Ok(())
}

#[cfg(feature = "std")]
fn io_error(e: std::io::Error) -> SecretsError {
    log::debug!("Secret file I/O failed: {}", e);
    if e.kind() == std::io::ErrorKind::NotFound {
        SecretsError::NotFound
    } else {
        SecretsError::IoError
    }
}

/// Decode a run of `\xHH` escapes
fn decode_escaped(value: &str, line: usize) -> Result<Vec<u8>, SecretsError> {
    let mut bytes = Vec::with_capacity(value.len() / 4);
    let mut rest = value;

    while !rest.is_empty() {
        rest = rest
            .strip_prefix("\\x")
            .ok_or(SecretsError::Malformed {
                line,
                reason: "expected \\x escape",
            })?;

        let end = rest.find('\\').unwrap_or(rest.len());
        let digits = &rest[..end];
        if digits.len() % 2 != 0 {
            return Err(SecretsError::Malformed {
                line,
                reason: "odd number of hex digits",
            });
        }
        if digits.len() != 2 {
            return Err(SecretsError::Malformed {
                line,
                reason: "expected two hex digits per byte",
            });
        }

        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(SecretsError::Malformed {
                line,
                reason: "invalid hex digit",
            });
        }
        let byte = u8::from_str_radix(digits, 16).map_err(|_| SecretsError::Malformed {
            line,
            reason: "invalid hex digit",
        })?;
        bytes.push(byte);
        rest = &rest[end..];
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    fn sample_set() -> SecretKeySet {
        SecretKeySet::from_entries(
            KeyName::ALL
                .iter()
                .enumerate()
                .map(|(i, &k)| (k, (0..k.size()).map(|b| (b * 7 + i) as u8).collect())),
        )
        .unwrap()
    }

    #[test]
    fn test_key_sizes() {
        assert_eq!(KeyName::FwKey.size(), 32);
        assert_eq!(KeyName::VerifyKey.size(), 32);
        assert_eq!(KeyName::RbIv.size(), 16);
        assert_eq!(KeyName::RbPw.size(), 24);
    }

    #[test]
    fn test_from_name() {
        for key in KeyName::ALL {
            assert_eq!(KeyName::from_name(key.as_str()), Some(key));
        }
        assert_eq!(KeyName::from_name("H_IV"), None);
    }

    #[test]
    fn test_generate_distinct_values() {
        let set = SecretKeySet::generate().unwrap();
        for key in KeyName::ALL {
            assert_eq!(set.get(key).len(), key.size());
        }
        let keys = [KeyName::FwKey, KeyName::RbKey, KeyName::HKey, KeyName::RbhKey];
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(set.get(*a), set.get(*b));
            }
        }
    }

    #[test]
    fn test_text_roundtrip() {
        let set = sample_set();
        let text = set.to_c_defines();
        assert!(text.starts_with("#define FW_KEY \"\\x00\\x07\\x0e"));
        assert_eq!(text.lines().count(), KeyName::COUNT);
        assert_eq!(SecretKeySet::parse(&text).unwrap(), set);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret_build_output.txt");
        let set = SecretKeySet::generate().unwrap();
        set.persist(&path).unwrap();
        assert_eq!(SecretKeySet::load(&path).unwrap(), set);
    }

    #[test]
    fn test_promote_file_is_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let build = dir.path().join("build.txt");
        let field = dir.path().join("field.txt");
        sample_set().persist(&build).unwrap();

        promote_file(&build, &field).unwrap();
        assert_eq!(
            std::fs::read(&build).unwrap(),
            std::fs::read(&field).unwrap()
        );
        assert_eq!(SecretKeySet::load(&field).unwrap().promote(), sample_set());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            SecretKeySet::load(dir.path().join("nope.txt")),
            Err(SecretsError::NotFound)
        );
    }

    #[test]
    fn test_legacy_uppercase_directive() {
        let text = sample_set().to_c_defines().replace("#define", "#DEFINE");
        assert_eq!(SecretKeySet::parse(&text).unwrap(), sample_set());
    }

    #[test]
    fn test_malformed_shape() {
        let err = SecretKeySet::parse("#define FW_KEY\n").unwrap_err();
        assert!(matches!(err, SecretsError::Malformed { line: 1, .. }));

        let err = SecretKeySet::parse("\n#include FW_KEY \"\\x00\"\n").unwrap_err();
        assert!(matches!(err, SecretsError::Malformed { line: 2, .. }));

        let err = SecretKeySet::parse("#define FW_KEY \\x00\n").unwrap_err();
        assert!(matches!(err, SecretsError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_odd_hex_digits() {
        let err = SecretKeySet::parse("#define FW_KEY \"\\x0\\x12\"\n").unwrap_err();
        assert_eq!(
            err,
            SecretsError::Malformed {
                line: 1,
                reason: "odd number of hex digits"
            }
        );
    }

    #[test]
    fn test_signed_escape_rejected() {
        let text = sample_set().to_c_defines();
        let at = text.find("\\x").unwrap() + 2;
        let tampered = alloc::format!("{}+1{}", &text[..at], &text[at + 2..]);
        let err = SecretKeySet::parse(&tampered).unwrap_err();
        assert!(matches!(
            err,
            SecretsError::Malformed {
                reason: "invalid hex digit",
                ..
            }
        ));

        let err = SecretKeySet::parse("#define FW_KEY \"\\x+1\"\n").unwrap_err();
        assert_eq!(
            err,
            SecretsError::Malformed {
                line: 1,
                reason: "invalid hex digit"
            }
        );
    }

    #[test]
    fn test_unknown_and_duplicate_keys() {
        let err = SecretKeySet::parse("#define H_IV \"\\x00\"\n").unwrap_err();
        assert_eq!(err, SecretsError::UnknownKey { line: 1 });

        let mut text = sample_set().to_c_defines().to_string();
        let first = text.lines().next().unwrap().to_string();
        text.push_str(&first);
        assert_eq!(
            SecretKeySet::parse(&text).unwrap_err(),
            SecretsError::DuplicateKey(KeyName::FwKey)
        );
    }

    #[test]
    fn test_missing_and_short_keys() {
        let text: String = sample_set()
            .to_c_defines()
            .lines()
            .filter(|l| !l.contains("RB_PW"))
            .map(|l| alloc::format!("{}\n", l))
            .collect();
        assert_eq!(
            SecretKeySet::parse(&text).unwrap_err(),
            SecretsError::MissingKey(KeyName::RbPw)
        );

        let err = SecretKeySet::from_entries([(KeyName::FwIv, vec![0u8; 8])]).unwrap_err();
        assert_eq!(
            err,
            SecretsError::BadLength {
                key: KeyName::FwIv,
                expected: 16,
                actual: 8
            }
        );
    }

    #[test]
    fn test_debug_redacts() {
        let dbg = alloc::format!("{:?}", sample_set());
        assert!(dbg.contains("FW_KEY"));
        assert!(!dbg.contains("0x"));
        assert!(dbg.contains("<redacted>"));
    }
}
