//! Decoding certificates from files and byte blobs.
//!
//! A blob may hold a single DER certificate, several concatenated DER
//! certificates, or any number of PEM blocks with arbitrary text between them.
//! Every unit is decoded on its own, so one corrupt certificate never hides
//! the others.

use std::fs;
use std::path::Path;

use der::{Decode, Header, Reader, SliceReader};
use tracing::debug;

use crate::cert::Certificate;
use crate::error::{Error, ErrorCode};

const PEM_BEGIN: &str = "-----BEGIN ";
const PEM_END: &str = "-----END ";
const PEM_DASHES: &str = "-----";

/// Certificates decoded from one input, plus a diagnostic per failed unit.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub certs: Vec<Certificate>,
    pub errors: Vec<Error>,
}

impl LoadOutcome {
    /// Number of certificates loaded.
    pub fn count(&self) -> usize {
        self.certs.len()
    }
}

/// Reads `path` and decodes every certificate in it.
pub fn load_certs_from_file(path: impl AsRef<Path>) -> LoadOutcome {
    let path = path.as_ref();
    match fs::read(path) {
        Ok(data) => {
            let outcome = load_certs_from_bytes(&data);
            debug!(
                path = %path.display(),
                certs = outcome.count(),
                errors = outcome.errors.len(),
                "loaded certificate file"
            );
            outcome
        }
        Err(e) => LoadOutcome {
            certs: Vec::new(),
            errors: vec![Error::coded(
                ErrorCode::FileRead,
                format!("cannot read {}: {e}", path.display()),
            )],
        },
    }
}

/// Decodes every certificate in `data`.
pub fn load_certs_from_bytes(data: &[u8]) -> LoadOutcome {
    let mut outcome = LoadOutcome::default();
    if data.iter().all(u8::is_ascii_whitespace) {
        return outcome;
    }

    if data[0] == 0x30 {
        load_der_sequence(data, &mut outcome);
    } else if contains_pem_begin(data) {
        // Block contents are ASCII; stray bytes between blocks are irrelevant.
        load_pem_blocks(&String::from_utf8_lossy(data), &mut outcome);
    } else {
        outcome.errors.push(Error::coded(
            ErrorCode::ParseCert,
            "input is neither DER nor PEM encoded",
        ));
    }
    outcome
}

fn contains_pem_begin(data: &[u8]) -> bool {
    data.windows(PEM_BEGIN.len())
        .any(|window| window == PEM_BEGIN.as_bytes())
}

/// Total encoded length of the DER element at the start of `bytes`.
fn der_element_len(bytes: &[u8]) -> der::Result<usize> {
    let mut reader = SliceReader::new(bytes)?;
    let header = Header::decode(&mut reader)?;
    let total = (reader.position() + header.length)?;
    usize::try_from(total)
}

/// Decodes the certificate at the start of `bytes`, returning its encoded length.
fn decode_der_element(bytes: &[u8]) -> Result<(Certificate, usize), Error> {
    let len = der_element_len(bytes)
        .map_err(|e| Error::coded(ErrorCode::ParseCert, format!("bad DER header: {e}")))?;
    if len > bytes.len() {
        return Err(Error::coded(
            ErrorCode::ParseCert,
            format!("truncated: needs {len} bytes, {} remain", bytes.len()),
        ));
    }
    Ok((Certificate::from_der(&bytes[..len])?, len))
}

/// Offset of the next decodable certificate at or after `from`.
fn resync(data: &[u8], from: usize) -> usize {
    (from..data.len())
        .filter(|&i| data[i] == 0x30)
        .find(|&i| decode_der_element(&data[i..]).is_ok())
        .unwrap_or(data.len())
}

fn load_der_sequence(data: &[u8], outcome: &mut LoadOutcome) {
    let mut offset = 0;
    let mut index = 0;
    while offset < data.len() {
        index += 1;
        match decode_der_element(&data[offset..]) {
            Ok((cert, len)) => {
                debug!(index, subject = cert.subject(), "decoded DER certificate");
                outcome.certs.push(cert);
                offset += len;
            }
            Err(e) => {
                let next = resync(data, offset + 1);
                debug!(index, offset, skipped = next - offset, error = %e, "skipping DER bytes");
                outcome
                    .errors
                    .push(e.context(format!("DER element {index} at offset {offset}")));
                offset = next;
            }
        }
    }
}

fn load_pem_blocks(text: &str, outcome: &mut LoadOutcome) {
    let mut rest = text;
    let mut index = 0;
    while let Some(start) = rest.find(PEM_BEGIN) {
        index += 1;
        let block = &rest[start..];
        let Some(end) = block.find(PEM_END) else {
            outcome.errors.push(Error::coded(
                ErrorCode::ParseCert,
                format!("PEM block {index} has no END line"),
            ));
            break;
        };
        let label_start = end + PEM_END.len();
        let close = block[label_start..]
            .find(PEM_DASHES)
            .map_or(block.len(), |i| label_start + i + PEM_DASHES.len());

        match decode_pem_block(&block[..close]) {
            Ok(cert) => {
                debug!(index, subject = cert.subject(), "decoded PEM certificate");
                outcome.certs.push(cert);
            }
            Err(e) => {
                debug!(index, error = %e, "skipping PEM block");
                outcome.errors.push(e.context(format!("PEM block {index}")));
            }
        }
        rest = &block[close..];
    }
}

fn decode_pem_block(block: &str) -> Result<Certificate, Error> {
    let parsed = pem::parse(block)?;
    match parsed.tag() {
        "CERTIFICATE" | "X509 CERTIFICATE" => Certificate::from_der(parsed.contents()),
        other => Err(Error::coded(
            ErrorCode::UnexpectedPemLabel,
            format!("unexpected PEM label '{other}'"),
        )),
    }
}
