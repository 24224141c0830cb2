use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use graph_auth::auth::{DeviceCodeInfo, GraphSession};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::cli::TokenArgs;
use crate::config::CliConfig;

pub async fn execute(
    args: TokenArgs,
    config: &CliConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut settings = config.provider_settings();
    settings.device_code_callback = Some(Arc::new(|info: &DeviceCodeInfo| {
        eprintln!("{}", info.message);
    }));

    let options = args.connect.into_options();
    log::debug!("Connecting with {options:?}");

    let session = GraphSession::new(settings);
    session.connect(&options).await?;
    let token = Zeroizing::new(session.get_token(&cancel).await?);

    match args.output_file {
        Some(path) => {
            write_token_file(&path, &token)
                .await
                .with_context(|| format!("Failed to write token to {}", path.display()))?;
            log::info!("Token written to {}", path.display());
        }
        None => println!("{}", token.as_str()),
    }
    Ok(())
}

/// Writes the token readable by the current user only, replacing any old content.
pub async fn write_token_file(path: &Path, token: &str) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    #[cfg(unix)]
    {
        // mode() only applies when the file is created
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }
    file.write_all(token.as_bytes()).await?;
    file.flush().await
}
