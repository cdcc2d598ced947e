//! Run configuration: the shared parameter context and layered engine settings.

mod params;
mod settings;

pub use params::{hash_parameters, Lookup, ParamContext, ParamOverrides};
pub use settings::{load_settings, EngineSettings, DEFAULT_CONFIG_FILE, ENV_PREFIX};
