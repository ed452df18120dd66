//! Authenticator data and CBOR envelopes for TPM-produced blobs.

use ciborium::value::Value;

use super::TpmError;

/// Identifies blobs produced by the TPM backend.
pub const AAGUID: [u8; 16] = [
    0x64, 0x65, 0x76, 0x61, 0x74, 0x74, 0x65, 0x73, 0x74, 0x2d, 0x74, 0x70, 0x6d, 0x00, 0x00, 0x01,
];

const FLAG_UP: u8 = 0x01;
const FLAG_AT: u8 = 0x40;

/// authData for attestation: attested credential data follows the header.
pub(crate) fn build_attested_auth_data(
    app_id_hash: &[u8; 32],
    key_hash: &[u8; 32],
    public_key_x: &[u8; 32],
    public_key_y: &[u8; 32],
) -> Result<Vec<u8>, TpmError> {
    let cose_key = encode_cose_key(public_key_x, public_key_y)?;
    let mut data = Vec::with_capacity(87 + cose_key.len());
    data.extend_from_slice(app_id_hash);
    data.push(FLAG_UP | FLAG_AT);
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(&AAGUID);
    data.extend_from_slice(&(key_hash.len() as u16).to_be_bytes());
    data.extend_from_slice(key_hash);
    data.extend_from_slice(&cose_key);
    Ok(data)
}

/// authData for assertion: header only.
pub(crate) fn build_assertion_auth_data(app_id_hash: &[u8; 32], counter: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(37);
    data.extend_from_slice(app_id_hash);
    data.push(FLAG_UP);
    data.extend_from_slice(&counter.to_be_bytes());
    data
}

/// P-256 public key as a COSE_Key map (kty=2, alg=-7, crv=1, x, y).
pub(crate) fn encode_cose_key(x: &[u8; 32], y: &[u8; 32]) -> Result<Vec<u8>, TpmError> {
    let map = Value::Map(vec![
        (Value::Integer(1i64.into()), Value::Integer(2i64.into())),
        (Value::Integer(3i64.into()), Value::Integer((-7i64).into())),
        (Value::Integer((-1i64).into()), Value::Integer(1i64.into())),
        (Value::Integer((-2i64).into()), Value::Bytes(x.to_vec())),
        (Value::Integer((-3i64).into()), Value::Bytes(y.to_vec())),
    ]);
    to_cbor(&map)
}

/// "packed" self-attestation object.
pub(crate) fn build_attestation_object(
    auth_data: &[u8],
    der_sig: &[u8],
) -> Result<Vec<u8>, TpmError> {
    let map = Value::Map(vec![
        (Value::Text("fmt".into()), Value::Text("packed".into())),
        (Value::Text("authData".into()), Value::Bytes(auth_data.to_vec())),
        (
            Value::Text("attStmt".into()),
            Value::Map(vec![
                (Value::Text("alg".into()), Value::Integer((-7i64).into())),
                (Value::Text("sig".into()), Value::Bytes(der_sig.to_vec())),
            ]),
        ),
    ]);
    to_cbor(&map)
}

pub(crate) fn build_assertion_object(
    auth_data: &[u8],
    der_sig: &[u8],
) -> Result<Vec<u8>, TpmError> {
    let map = Value::Map(vec![
        (Value::Text("signature".into()), Value::Bytes(der_sig.to_vec())),
        (Value::Text("authenticatorData".into()), Value::Bytes(auth_data.to_vec())),
    ]);
    to_cbor(&map)
}

fn to_cbor(value: &Value) -> Result<Vec<u8>, TpmError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| TpmError::Encoding(e.to_string()))?;
    Ok(buf)
}

/// DER-encode a raw P-256 ECDSA signature (r || s).
pub(crate) fn encode_der_ecdsa(raw: &[u8; 64]) -> Vec<u8> {
    let r = der_integer(&raw[..32]);
    let s = der_integer(&raw[32..]);
    let mut out = vec![0x30u8, (r.len() + s.len()) as u8];
    out.extend_from_slice(&r);
    out.extend_from_slice(&s);
    out
}

fn der_integer(n: &[u8]) -> Vec<u8> {
    let start = n.iter().position(|&b| b != 0).unwrap_or(n.len() - 1);
    let n = &n[start..];
    let pad = n[0] & 0x80 != 0;
    let mut out = vec![0x02u8, n.len() as u8 + pad as u8];
    if pad {
        out.push(0);
    }
    out.extend_from_slice(n);
    out
}
