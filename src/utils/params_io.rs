use anyhow::Context;
use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::{env, path::Path};

/// Get the command-line argument at position `pos`.
pub fn take_from_args(pos: usize) -> Option<String> {
    env::args().nth(pos)
}

/// Load a config from several files, later ones overriding earlier ones,
/// then overlay environment variables (`PREFIX__FIELD`).
/// Missing files are skipped.
pub fn load_cfg_merge<T, P>(
    paths: impl IntoIterator<Item = P>,
    env_prefix: Option<&str>,
) -> anyhow::Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let mut builder = Config::builder();

    for p in paths {
        let pb = p.as_ref().to_path_buf();
        if pb.exists() {
            builder = builder.add_source(File::from(pb));
        } else {
            tracing::warn!("config loading: file {} does not exist", pb.display());
        }
    }

    builder = match env_prefix {
        Some(prefix) => builder.add_source(
            Environment::with_prefix(prefix)
                .separator("__")
                .try_parsing(true),
        ),
        None => builder.add_source(Environment::default().separator("__").try_parsing(true)),
    };

    builder
        .build()
        .context("failed to build merged config")?
        .try_deserialize()
        .context("failed to deserialize merged config")
}
