//! NVS-backed store for the persisted [`ModemConfig`].
//!
//! The config is kept as one postcard blob under `bgxx::modemcfg`. A
//! missing or unreadable blob falls back to defaults; a blob that fails
//! validation is reported so the caller can decide.

use log::{info, warn};

use crate::config::{ConfigError, ModemConfig};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
const CONFIG_NAMESPACE: &[u8] = b"bgxx\0";
#[cfg(target_os = "espidf")]
const CONFIG_KEY: &[u8] = b"modemcfg\0";
#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 512;

pub struct ConfigStore {
    #[cfg(not(target_os = "espidf"))]
    blob: std::cell::RefCell<Option<Vec<u8>>>,
}

impl ConfigStore {
    /// Initialise NVS flash, erasing it on a layout/version mismatch.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK || unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("ConfigStore: NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("ConfigStore: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            blob: std::cell::RefCell::new(None),
        })
    }

    /// Stored config, or defaults when nothing usable is stored.
    pub fn load(&self) -> Result<ModemConfig, ConfigError> {
        match self.read_blob() {
            Ok(Some(bytes)) => {
                let cfg = ModemConfig::from_blob(&bytes)?;
                info!("ConfigStore: loaded config ({} bytes)", bytes.len());
                Ok(cfg)
            }
            Ok(None) => {
                info!("ConfigStore: no stored config, using defaults");
                Ok(ModemConfig::default())
            }
            Err(e) => {
                warn!("ConfigStore: read failed ({}), using defaults", e);
                Ok(ModemConfig::default())
            }
        }
    }

    /// Validate and persist `config`.
    pub fn save(&self, config: &ModemConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = config.to_blob()?;
        self.write_blob(&bytes)?;
        info!("ConfigStore: config saved ({} bytes)", bytes.len());
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_blob(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        Ok(self.blob.borrow().clone())
    }

    #[cfg(not(target_os = "espidf"))]
    fn write_blob(&self, bytes: &[u8]) -> Result<(), ConfigError> {
        *self.blob.borrow_mut() = Some(bytes.to_vec());
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn read_blob(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        with_handle(false, |handle| {
            let mut size: usize = 0;
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    CONFIG_KEY.as_ptr() as *const _,
                    core::ptr::null_mut(),
                    &mut size,
                )
            };
            if ret == ESP_ERR_NVS_NOT_FOUND {
                return Ok(None);
            }
            if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                return Err(ret);
            }
            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    CONFIG_KEY.as_ptr() as *const _,
                    buf.as_mut_ptr() as *mut _,
                    &mut size,
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(Some(buf))
        })
        .or_else(|e| {
            // A namespace that was never written cannot be opened read-only.
            if e == ESP_ERR_NVS_NOT_FOUND {
                Ok(None)
            } else {
                warn!("ConfigStore: NVS read error {}", e);
                Err(ConfigError::IoError)
            }
        })
    }

    #[cfg(target_os = "espidf")]
    fn write_blob(&self, bytes: &[u8]) -> Result<(), ConfigError> {
        with_handle(true, |handle| {
            let ret = unsafe {
                nvs_set_blob(
                    handle,
                    CONFIG_KEY.as_ptr() as *const _,
                    bytes.as_ptr() as *const _,
                    bytes.len(),
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        })
        .map_err(|e| {
            warn!("ConfigStore: NVS write error {}", e);
            ConfigError::IoError
        })
    }
}

/// Open the config namespace, run `f` with the handle, then close it.
#[cfg(target_os = "espidf")]
fn with_handle<T>(write: bool, f: impl FnOnce(nvs_handle_t) -> Result<T, i32>) -> Result<T, i32> {
    let mut handle: nvs_handle_t = 0;
    let mode = if write {
        nvs_open_mode_t_NVS_READWRITE
    } else {
        nvs_open_mode_t_NVS_READONLY
    };
    let ret = unsafe { nvs_open(CONFIG_NAMESPACE.as_ptr() as *const _, mode, &mut handle) };
    if ret != ESP_OK {
        return Err(ret);
    }
    let result = f(handle);
    unsafe {
        nvs_close(handle);
    }
    result
}
