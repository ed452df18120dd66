use super::{TpmError, counter, keys};
use std::sync::{Arc, Mutex};
use tss_esapi::handles::KeyHandle;
use tss_esapi::{Context, TctiNameConf};

struct TpmContextInner {
    ctx: Mutex<Context>,
    primary: KeyHandle,
    nv_index: u32,
}

/// Shared ESAPI context plus the primary key every device key is wrapped by.
#[derive(Clone)]
pub struct TpmContext {
    inner: Arc<TpmContextInner>,
}

impl TpmContext {
    /// Open `device_path`, recreate the primary key and make sure the NV
    /// usage counter at `nv_index` exists.
    pub fn open(device_path: &str, nv_index: u32) -> Result<Self, TpmError> {
        let tcti = format!("device:{device_path}")
            .parse::<TctiNameConf>()
            .map_err(|e| TpmError::Context(e.to_string()))?;
        let mut ctx = Context::new(tcti).map_err(|e| TpmError::Context(e.to_string()))?;
        let primary = keys::create_primary(&mut ctx)?;
        counter::ensure_counter(&mut ctx, nv_index)?;
        Ok(Self {
            inner: Arc::new(TpmContextInner {
                ctx: Mutex::new(ctx),
                primary,
                nv_index,
            }),
        })
    }

    pub fn nv_index(&self) -> u32 {
        self.inner.nv_index
    }

    /// Run a synchronous TPM operation on the calling thread.
    pub fn with_ctx<F, T>(&self, f: F) -> Result<T, TpmError>
    where
        F: FnOnce(&mut Context, KeyHandle) -> Result<T, TpmError>,
    {
        let mut ctx = self
            .inner
            .ctx
            .lock()
            .map_err(|_| TpmError::Context("mutex poisoned".into()))?;
        f(&mut ctx, self.inner.primary)
    }

    /// `with_ctx` on the blocking pool.
    pub async fn run<F, T>(&self, f: F) -> Result<T, TpmError>
    where
        F: FnOnce(&mut Context, KeyHandle) -> Result<T, TpmError> + Send + 'static,
        T: Send + 'static,
    {
        let tpm = self.clone();
        tokio::task::spawn_blocking(move || tpm.with_ctx(f))
            .await
            .map_err(|e| TpmError::Other(e.to_string()))?
    }
}
