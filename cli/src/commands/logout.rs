use crate::cli::LogoutArgs;
use crate::config::CliConfig;

pub async fn execute(args: LogoutArgs, config: &CliConfig) -> anyhow::Result<()> {
    let acquirer = config.provider_settings().acquirer(args.client_id);
    let removed = acquirer.sign_out().await?;

    match removed {
        0 => println!("No cached accounts to remove"),
        1 => println!("Removed 1 cached account"),
        n => println!("Removed {n} cached accounts"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::assert_ok;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_logout_with_empty_cache() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("bettergraph.toml");
        std::fs::write(
            &config_path,
            format!("cache_dir = {:?}\n", dir.path().display().to_string()),
        )
        .unwrap();
        let config = CliConfig::load(Some(&config_path)).unwrap();

        assert_ok!(execute(LogoutArgs { client_id: None }, &config).await);
    }
}
