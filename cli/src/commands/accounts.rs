use graph_auth::auth::Account;

use crate::cli::AccountsArgs;
use crate::config::CliConfig;

pub async fn execute(args: AccountsArgs, config: &CliConfig) -> anyhow::Result<()> {
    let acquirer = config.provider_settings().acquirer(args.client_id);
    let accounts = acquirer.accounts().await?;
    log::debug!("Found {} cached account(s)", accounts.len());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
    } else {
        print!("{}", format_accounts(&accounts));
    }
    Ok(())
}

/// One line per account: username, tenant, authority host.
pub fn format_accounts(accounts: &[Account]) -> String {
    if accounts.is_empty() {
        return "No cached accounts\n".to_string();
    }

    let width = accounts
        .iter()
        .map(|a| a.username.len())
        .max()
        .unwrap_or(0)
        .max("USERNAME".len());

    let mut out = format!("{:<width$}  {:<36}  {}\n", "USERNAME", "TENANT", "ENVIRONMENT");
    for account in accounts {
        out.push_str(&format!(
            "{:<width$}  {:<36}  {}\n",
            account.username, account.tenant_id, account.environment
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::assert_ok;
    use tempfile::TempDir;

    fn account(username: &str) -> Account {
        Account {
            home_account_id: format!("{username}.72f988bf-86f1-41af-91ab-2d7cd011db47"),
            tenant_id: "72f988bf-86f1-41af-91ab-2d7cd011db47".to_string(),
            username: username.to_string(),
            environment: "login.microsoftonline.com".to_string(),
        }
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(format_accounts(&[]), "No cached accounts\n");
    }

    #[test]
    fn test_columns_align_to_longest_username() {
        let out = format_accounts(&[account("ada@contoso.com"), account("bob@contoso.com")]);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("USERNAME"));
        let tenant_column = lines[0].find("TENANT").unwrap();
        assert_eq!(lines[1].find("72f988bf"), Some(tenant_column));
        assert_eq!(lines[2].find("72f988bf"), Some(tenant_column));
    }

    #[tokio::test]
    async fn test_empty_cache_directory() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("bettergraph.toml");
        std::fs::write(
            &config_path,
            format!("cache_dir = {:?}\n", dir.path().display().to_string()),
        )
        .unwrap();
        let config = CliConfig::load(Some(&config_path)).unwrap();

        let args = AccountsArgs {
            client_id: None,
            json: true,
        };
        assert_ok!(execute(args, &config).await);
    }
}
