use super::TpmError;
use sha2::Digest as ShaDigest;
use sha2::Sha256;
use tss_esapi::Context;
use tss_esapi::attributes::ObjectAttributesBuilder;
use tss_esapi::constants::tss::TPM2_RH_NULL;
use tss_esapi::constants::tss::TPM2_ST_HASHCHECK;
use tss_esapi::handles::KeyHandle;
use tss_esapi::handles::ObjectHandle;
use tss_esapi::interface_types::algorithm::HashingAlgorithm;
use tss_esapi::interface_types::algorithm::PublicAlgorithm;
use tss_esapi::interface_types::ecc::EccCurve;
use tss_esapi::interface_types::reserved_handles::Hierarchy;
use tss_esapi::structures::Digest;
use tss_esapi::structures::EccPoint;
use tss_esapi::structures::EccScheme;
use tss_esapi::structures::HashScheme;
use tss_esapi::structures::HashcheckTicket;
use tss_esapi::structures::Private;
use tss_esapi::structures::Public;
use tss_esapi::structures::PublicBuilder;
use tss_esapi::structures::PublicEccParametersBuilder;
use tss_esapi::structures::Signature;
use tss_esapi::structures::SignatureScheme;
use tss_esapi::structures::SymmetricDefinitionObject;
use tss_esapi::traits::Marshall;
use tss_esapi::traits::UnMarshall;
use tss_esapi::tss2_esys::TPMT_TK_HASHCHECK;

fn key_err(e: impl std::fmt::Display) -> TpmError {
    TpmError::Key(e.to_string())
}

/// Owner-hierarchy ECC storage key. Deterministic for a given TPM, so it is
/// recreated on every start instead of being persisted.
pub fn create_primary(ctx: &mut Context) -> Result<KeyHandle, TpmError> {
    let ecc_params = PublicEccParametersBuilder::new_restricted_decryption_key(
        SymmetricDefinitionObject::AES_128_CFB,
        EccCurve::NistP256,
    )
    .build()
    .map_err(key_err)?;

    let attrs = ObjectAttributesBuilder::new()
        .with_fixed_tpm(true)
        .with_fixed_parent(true)
        .with_sensitive_data_origin(true)
        .with_user_with_auth(true)
        .with_restricted(true)
        .with_decrypt(true)
        .build()
        .map_err(key_err)?;

    let template = PublicBuilder::new()
        .with_public_algorithm(PublicAlgorithm::Ecc)
        .with_name_hashing_algorithm(HashingAlgorithm::Sha256)
        .with_object_attributes(attrs)
        .with_ecc_parameters(ecc_params)
        .with_ecc_unique_identifier(EccPoint::default())
        .build()
        .map_err(key_err)?;

    let result = ctx
        .execute_with_nullauth_session(|ctx| {
            ctx.create_primary(Hierarchy::Owner, template, None, None, None, None)
        })
        .map_err(|e: tss_esapi::Error| key_err(e))?;

    Ok(result.key_handle)
}

/// Device-bound P-256 signing key wrapped by `primary`.
/// Returns the (private, marshalled public) blobs.
pub fn create_signing_key(
    ctx: &mut Context,
    primary: KeyHandle,
) -> Result<(Vec<u8>, Vec<u8>), TpmError> {
    let scheme = EccScheme::EcDsa(HashScheme::new(HashingAlgorithm::Sha256));
    let ecc_params =
        PublicEccParametersBuilder::new_unrestricted_signing_key(scheme, EccCurve::NistP256)
            .build()
            .map_err(key_err)?;

    let attrs = ObjectAttributesBuilder::new()
        .with_fixed_tpm(true)
        .with_fixed_parent(true)
        .with_sensitive_data_origin(true)
        .with_user_with_auth(true)
        .with_sign_encrypt(true)
        .with_no_da(true)
        .build()
        .map_err(key_err)?;

    let template = PublicBuilder::new()
        .with_public_algorithm(PublicAlgorithm::Ecc)
        .with_name_hashing_algorithm(HashingAlgorithm::Sha256)
        .with_object_attributes(attrs)
        .with_ecc_parameters(ecc_params)
        .with_ecc_unique_identifier(EccPoint::default())
        .build()
        .map_err(key_err)?;

    let result = ctx
        .execute_with_nullauth_session(|ctx| ctx.create(primary, template, None, None, None, None))
        .map_err(|e: tss_esapi::Error| key_err(e))?;

    let private_bytes = result.out_private.as_bytes().to_vec();
    let public_bytes = result.out_public.marshall().map_err(key_err)?;
    Ok((private_bytes, public_bytes))
}

/// Load the key, sign `data`, and flush the handle whether or not signing
/// succeeded. Returns raw (r || s), each zero-padded to 32 bytes.
pub fn sign_with(
    ctx: &mut Context,
    primary: KeyHandle,
    private_bytes: &[u8],
    public_bytes: &[u8],
    data: &[u8],
) -> Result<[u8; 64], TpmError> {
    let handle = load_key(ctx, primary, private_bytes, public_bytes)?;
    let signed = sign(ctx, handle, data);
    flush(ctx, handle)?;
    signed
}

pub fn load_key(
    ctx: &mut Context,
    primary: KeyHandle,
    private_bytes: &[u8],
    public_bytes: &[u8],
) -> Result<KeyHandle, TpmError> {
    let private = Private::try_from(private_bytes.to_vec()).map_err(key_err)?;
    let public = Public::unmarshall(public_bytes).map_err(key_err)?;

    ctx.execute_with_nullauth_session(|ctx| ctx.load(primary, private, public))
        .map_err(|e: tss_esapi::Error| key_err(e))
}

fn sign(ctx: &mut Context, key: KeyHandle, data: &[u8]) -> Result<[u8; 64], TpmError> {
    let hash_bytes: [u8; 32] = Sha256::digest(data).into();
    let digest = Digest::try_from(hash_bytes.to_vec()).map_err(key_err)?;

    // Null-hierarchy ticket: the digest was computed outside the TPM.
    let raw_ticket = TPMT_TK_HASHCHECK {
        tag: TPM2_ST_HASHCHECK,
        hierarchy: TPM2_RH_NULL,
        digest: Default::default(),
    };
    let validation: HashcheckTicket = raw_ticket
        .try_into()
        .map_err(|e: tss_esapi::Error| key_err(e))?;

    let signature = ctx
        .execute_with_nullauth_session(|ctx| {
            ctx.sign(key, digest, SignatureScheme::Null, validation)
        })
        .map_err(|e: tss_esapi::Error| key_err(e))?;

    match signature {
        Signature::EcDsa(ecc_sig) => {
            let mut out = [0u8; 64];
            left_pad(&mut out[..32], ecc_sig.signature_r().as_bytes());
            left_pad(&mut out[32..], ecc_sig.signature_s().as_bytes());
            Ok(out)
        }
        _ => Err(TpmError::Key("expected ECDSA signature".into())),
    }
}

pub fn flush(ctx: &mut Context, handle: KeyHandle) -> Result<(), TpmError> {
    ctx.flush_context(ObjectHandle::from(handle)).map_err(key_err)
}

/// (x, y) of a marshalled TPM2B_PUBLIC ECC key.
pub fn ecc_public_coords(public_bytes: &[u8]) -> Result<([u8; 32], [u8; 32]), TpmError> {
    match Public::unmarshall(public_bytes).map_err(key_err)? {
        Public::Ecc { unique, .. } => {
            let mut x = [0u8; 32];
            let mut y = [0u8; 32];
            left_pad(&mut x, unique.x().as_bytes());
            left_pad(&mut y, unique.y().as_bytes());
            Ok((x, y))
        }
        _ => Err(TpmError::Key("not an ECC key".into())),
    }
}

fn left_pad(dst: &mut [u8], src: &[u8]) {
    let n = src.len().min(dst.len());
    let off = dst.len() - n;
    dst[off..].copy_from_slice(&src[src.len() - n..]);
}
