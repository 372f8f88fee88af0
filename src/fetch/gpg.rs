// src/fetch/gpg.rs

//! Detached OpenPGP signature checks
//!
//! Uses the sequoia-openpgp library (pure Rust implementation). Keys come
//! either embedded in the recipe or from an HKP keyserver by key id.

use crate::error::{Error, Result};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::{Cert, Packet, PacketPile};
use sequoia_openpgp as openpgp;
use tracing::debug;

/// Keyserver queried for key ids when none is configured
pub const DEFAULT_KEYSERVER: &str = "https://keyserver.ubuntu.com";

/// Parse key material embedded in a recipe
pub fn parse_key(material: &[u8]) -> Result<Cert> {
    Cert::from_bytes(material).map_err(|e| Error::InvalidGpgKey(e.to_string()))
}

/// Normalize a key id or fingerprint to uppercase hex without `0x`
///
/// Accepts short (8), long (16) and full fingerprint (40) forms; spaces
/// inside fingerprints are ignored.
pub fn normalize_key_id(id: &str) -> Result<String> {
    let compact: String = id.chars().filter(|c| !c.is_whitespace()).collect();
    let hex = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);

    if matches!(hex.len(), 8 | 16 | 40) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(hex.to_ascii_uppercase())
    } else {
        Err(Error::KeyDownloadFailed(format!("'{id}' is not a valid key id")))
    }
}

/// HKP lookup URL for a normalized key id
///
/// `hkp://` and `hkps://` keyservers map to their HTTP equivalents.
pub fn lookup_url(keyserver: &str, key_id: &str) -> String {
    let base = if let Some(rest) = keyserver.strip_prefix("hkps://") {
        format!("https://{rest}")
    } else if let Some(rest) = keyserver.strip_prefix("hkp://") {
        if rest.contains(':') {
            format!("http://{rest}")
        } else {
            format!("http://{rest}:11371")
        }
    } else {
        keyserver.to_string()
    };

    format!(
        "{}/pks/lookup?op=get&options=mr&search=0x{}",
        base.trim_end_matches('/'),
        key_id
    )
}

/// Parse a keyserver answer
pub fn parse_fetched_key(key_id: &str, body: &[u8]) -> Result<Cert> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::KeyDownloadFailed(format!(
            "keyserver returned nothing for {key_id}"
        )));
    }
    Cert::from_bytes(body)
        .map_err(|e| Error::KeyDownloadFailed(format!("keyserver answer for {key_id} is not a key: {e}")))
}

/// Check a detached signature over `data`
///
/// Succeeds if any signature packet verifies against any signing-capable
/// key of `cert` under the standard policy.
pub fn verify_detached(cert: &Cert, data: &[u8], signature: &[u8]) -> Result<()> {
    let policy = StandardPolicy::new();

    let pile = PacketPile::from_bytes(signature)
        .map_err(|e| Error::SignatureMismatch(format!("unreadable signature: {e}")))?;

    for packet in pile.descendants() {
        let Packet::Signature(sig) = packet else {
            continue;
        };
        for key in cert.keys().with_policy(&policy, None).for_signing() {
            let mut sig = sig.clone();
            if sig.verify_message(key.key(), data).is_ok() {
                debug!(
                    "Signature verified with key {} of {}",
                    key.key().fingerprint(),
                    cert.fingerprint()
                );
                return Ok(());
            }
        }
    }

    Err(Error::SignatureMismatch(format!(
        "no valid signature by {}",
        cert.fingerprint()
    )))
}
