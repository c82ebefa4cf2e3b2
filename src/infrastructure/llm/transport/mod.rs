//! Provider transports and construction-time selection.

pub mod compat;
pub mod native;

pub use compat::CompatTransport;
pub use native::NativeTransport;

use tracing::info;

use crate::domain::errors::{LlmError, LlmResult};
use crate::domain::models::{ClientConfig, CompatVendor, ProviderKind};
use crate::domain::ports::ProviderTransport;
use crate::infrastructure::logging::redact_key;

/// Select the transport for `config` and validate its credential.
///
/// The credential comes from `config.api_key`, falling back to the
/// provider's environment variable. An absent or blank credential is a
/// construction-time `MissingCredential` error.
pub fn build_transport(config: &ClientConfig) -> LlmResult<Box<dyn ProviderTransport>> {
    match config.provider {
        ProviderKind::Native => {
            let api_key = resolve_api_key(config.api_key.as_deref(), "native", native::API_KEY_ENV)?;
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| native::DEFAULT_BASE_URL.to_string());

            info!(
                provider = "native",
                base_url = %base_url,
                api_key = %redact_key(&api_key),
                "selected transport"
            );
            Ok(Box::new(NativeTransport::new(&base_url, &api_key, &config.api_version)?))
        }
        ProviderKind::Compat => {
            let vendor = config.vendor;
            let api_key = resolve_api_key(config.api_key.as_deref(), "compat", vendor.api_key_env())?;
            let base_url = resolve_compat_base_url(config.base_url.as_deref(), vendor)?;

            info!(
                provider = "compat",
                vendor = ?vendor,
                base_url = %base_url,
                api_key = %redact_key(&api_key),
                "selected transport"
            );
            Ok(Box::new(CompatTransport::new(&base_url, &api_key)?))
        }
    }
}

fn resolve_api_key(
    configured: Option<&str>,
    provider: &'static str,
    env_var: &'static str,
) -> LlmResult<String> {
    configured
        .map(str::to_string)
        .or_else(|| std::env::var(env_var).ok())
        .filter(|key| !key.trim().is_empty())
        .ok_or(LlmError::MissingCredential { provider, env_var })
}

fn resolve_compat_base_url(configured: Option<&str>, vendor: CompatVendor) -> LlmResult<String> {
    configured
        .map(str::to_string)
        .or_else(|| vendor.base_url_env().and_then(|var| std::env::var(var).ok()))
        .filter(|url| !url.trim().is_empty())
        .or_else(|| vendor.default_base_url().map(str::to_string))
        .ok_or_else(|| {
            LlmError::InvalidConfig(format!("vendor {vendor:?} requires an explicit base_url"))
        })
}
