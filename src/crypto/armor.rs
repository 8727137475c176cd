//! PEM-like text armor for key material.
//!
//! ```text
//! -----BEGIN LOGBOOK PUBLIC KEY-----
//! Algorithm: Ed25519
//!
//! 3d4017c3e843895a92b70aa74d1b7ebc9c982ccf2ec4968cc0cd55f12af4660c
//! -----END LOGBOOK PUBLIC KEY-----
//! ```
//!
//! The body is lowercase hex wrapped at 64 characters. Header lines are
//! `Name: value` pairs separated from the body by one blank line.

use crate::error::{PkiError, Result};

const LINE_WIDTH: usize = 64;

pub const PUBLIC_KEY_LABEL: &str = "LOGBOOK PUBLIC KEY";
pub const PRIVATE_KEY_LABEL: &str = "LOGBOOK PRIVATE KEY";

pub fn encode(label: &str, headers: &[(&str, &str)], body: &[u8]) -> String {
    let mut out = format!("-----BEGIN {}-----\n", label);
    for (name, value) in headers {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    if !headers.is_empty() {
        out.push('\n');
    }

    let encoded = hex::encode(body);
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        // hex output is ASCII
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push('\n');
    }
    out.push_str(&format!("-----END {}-----\n", label));
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Armored {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Armored {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub fn decode(label: &str, text: &str) -> Result<Armored> {
    let begin = format!("-----BEGIN {}-----", label);
    let end = format!("-----END {}-----", label);

    let mut lines = text.lines().map(str::trim).skip_while(|l| l.is_empty());
    match lines.next() {
        Some(line) if line == begin => {}
        _ => {
            return Err(PkiError::InvalidEncoding(format!(
                "missing '{}' marker",
                begin
            )));
        }
    }

    let mut headers = Vec::new();
    let mut body = String::new();
    let mut closed = false;
    for line in lines {
        if line == end {
            closed = true;
            break;
        }
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if !body.is_empty() {
                return Err(PkiError::InvalidEncoding(
                    "header after armored body".to_string(),
                ));
            }
            headers.push((name.trim().to_string(), value.trim().to_string()));
        } else {
            body.push_str(line);
        }
    }

    if !closed {
        return Err(PkiError::InvalidEncoding(format!(
            "missing '{}' marker",
            end
        )));
    }

    let body = hex::decode(&body).map_err(|e| PkiError::InvalidEncoding(e.to_string()))?;
    Ok(Armored { headers, body })
}
