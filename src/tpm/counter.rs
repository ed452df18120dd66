//! NV monotonic counter backing assertion sign counts.

use super::TpmError;
use tss_esapi::Context;
use tss_esapi::attributes::NvIndexAttributesBuilder;
use tss_esapi::constants::{CapabilityType, NvIndexType};
use tss_esapi::handles::{NvIndexHandle, NvIndexTpmHandle, TpmHandle};
use tss_esapi::interface_types::algorithm::HashingAlgorithm;
use tss_esapi::interface_types::resource_handles::{NvAuth, Provision};
use tss_esapi::structures::{CapabilityData, NvPublicBuilder};

fn counter_err(e: impl std::fmt::Display) -> TpmError {
    TpmError::Counter(e.to_string())
}

fn nv_handle(ctx: &mut Context, nv_index: u32) -> Result<NvIndexHandle, TpmError> {
    let tpm_handle = NvIndexTpmHandle::new(nv_index).map_err(counter_err)?;
    let obj = ctx
        .tr_from_tpm_public(TpmHandle::NvIndex(tpm_handle))
        .map_err(counter_err)?;
    Ok(NvIndexHandle::from(obj))
}

/// Probe via GetCapability so a missing index doesn't log a TPM error.
fn exists(ctx: &mut Context, nv_index: u32) -> Result<bool, TpmError> {
    let target = TpmHandle::NvIndex(NvIndexTpmHandle::new(nv_index).map_err(counter_err)?);
    let (cap, _) = ctx
        .get_capability(CapabilityType::Handles, nv_index, 1)
        .map_err(counter_err)?;
    Ok(matches!(cap, CapabilityData::Handles(h) if h.as_ref().contains(&target)))
}

/// Define and initialize the counter if missing. Idempotent.
pub fn ensure_counter(ctx: &mut Context, nv_index: u32) -> Result<(), TpmError> {
    if exists(ctx, nv_index)? {
        return Ok(());
    }

    let attrs = NvIndexAttributesBuilder::new()
        .with_nv_index_type(NvIndexType::Counter)
        .with_owner_write(true)
        .with_owner_read(true)
        .with_no_da(true)
        .build()
        .map_err(counter_err)?;

    let nv_public = NvPublicBuilder::new()
        .with_nv_index(NvIndexTpmHandle::new(nv_index).map_err(counter_err)?)
        .with_index_name_algorithm(HashingAlgorithm::Sha256)
        .with_index_attributes(attrs)
        .with_data_area_size(8)
        .build()
        .map_err(counter_err)?;

    ctx.execute_with_nullauth_session(|ctx| ctx.nv_define_space(Provision::Owner, None, nv_public))
        .map_err(|e: tss_esapi::Error| counter_err(e))?;
    tracing::info!(index = format!("{nv_index:#010x}"), "NV counter defined");

    // A counter is unreadable until its first increment.
    let handle = nv_handle(ctx, nv_index)?;
    ctx.execute_with_nullauth_session(|ctx| ctx.nv_increment(NvAuth::Owner, handle))
        .map_err(|e: tss_esapi::Error| counter_err(e))?;
    Ok(())
}

pub fn increment_and_read(ctx: &mut Context, nv_index: u32) -> Result<u64, TpmError> {
    let handle = nv_handle(ctx, nv_index)?;
    ctx.execute_with_nullauth_session(|ctx| ctx.nv_increment(NvAuth::Owner, handle))
        .map_err(|e: tss_esapi::Error| counter_err(e))?;
    read_counter(ctx, nv_index)
}

pub fn read_counter(ctx: &mut Context, nv_index: u32) -> Result<u64, TpmError> {
    let handle = nv_handle(ctx, nv_index)?;
    let buf = ctx
        .execute_with_nullauth_session(|ctx| ctx.nv_read(NvAuth::Owner, handle, 8, 0))
        .map_err(|e: tss_esapi::Error| counter_err(e))?;
    let bytes: [u8; 8] = buf
        .value()
        .try_into()
        .map_err(|_| TpmError::Counter("counter read returned wrong size".into()))?;
    Ok(u64::from_be_bytes(bytes))
}
