//! Buffered `multipart/form-data` assembly.
//!
//! The whole body is rendered into memory: upload streams are single-use,
//! and a buffered body can be replayed when a 307/308 redirect asks for the
//! request again. File parts come first, in caller order, then one text
//! field per data entry (sorted, so the payload is deterministic).

use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use bytes::Bytes;
use rand::RngCore;

use crate::errors::HttpError;
use crate::options::FileUpload;

#[derive(Debug)]
pub(crate) struct MultipartBody {
    pub(crate) bytes: Bytes,
    pub(crate) content_type: String,
}

pub(crate) fn encode_multipart(
    files: Vec<FileUpload>,
    data: &HashMap<String, String>,
) -> Result<MultipartBody, HttpError> {
    let boundary = random_boundary();
    let mut out: Vec<u8> = Vec::new();
    let file_count = files.len();

    for (index, file) in files.into_iter().enumerate() {
        let FileUpload {
            field_name,
            mut file_name,
            file_mime,
            mut contents,
        } = file;

        let field_name = match field_name.filter(|name| !name.is_empty()) {
            Some(name) => name,
            None if file_count > 1 => format!("file{}", index + 1),
            None => "file".to_string(),
        };
        if file_name.is_empty() {
            file_name = "filename".to_string();
        }
        let mime = file_mime
            .filter(|mime| !mime.is_empty())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        // Drain before writing headers so a failed stream aborts cleanly.
        let mut payload = Vec::new();
        contents.read_to_end(&mut payload).map_err(HttpError::Upload)?;

        out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        out.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                escape_quotes(&field_name),
                escape_quotes(&file_name)
            )
            .as_bytes(),
        );
        out.extend_from_slice(format!("Content-Type: {mime}\r\n\r\n").as_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(b"\r\n");
    }

    let sorted: BTreeMap<&String, &String> = data.iter().collect();
    for (key, value) in sorted {
        out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        out.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                escape_quotes(key)
            )
            .as_bytes(),
        );
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    Ok(MultipartBody {
        bytes: Bytes::from(out),
        content_type: format!("multipart/form-data; boundary={boundary}"),
    })
}

fn random_boundary() -> String {
    let mut buf = [0u8; 15];
    rand::rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{b:02x}")).collect()
}

fn escape_quotes(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
