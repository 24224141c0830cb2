use graph_auth::auth::{
    Account, InteractiveOptions, TokenCacheKey, select_account, strip_bearer,
};
use proptest::prelude::*;

fn account(tenant: &str, username: &str) -> Account {
    Account {
        home_account_id: format!("{username}.{tenant}"),
        tenant_id: tenant.to_string(),
        username: username.to_string(),
        environment: "login.microsoftonline.com".to_string(),
    }
}

fn guid() -> impl Strategy<Value = String> {
    any::<u128>().prop_map(|n| uuid::Uuid::from_u128(n).to_string())
}

#[cfg(test)]
mod account_selection_properties {
    use super::*;

    proptest! {
        #[test]
        fn test_selected_account_matches_guid_tenant(
            tenants in prop::collection::vec(guid(), 1..8),
            pick in any::<prop::sample::Index>()
        ) {
            let accounts: Vec<Account> = tenants
                .iter()
                .enumerate()
                .map(|(i, t)| account(t, &format!("user{i}@contoso.com")))
                .collect();
            let wanted = pick.get(&tenants);

            let selected = select_account(&accounts, Some(wanted.as_str()), None);

            // Property: a GUID tenant never selects an account from another tenant
            let selected = selected.expect("an account exists for the tenant");
            prop_assert_eq!(&selected.tenant_id, wanted);
        }

        #[test]
        fn test_non_guid_tenant_never_filters(
            tenant in "[a-z]{3,12}\\.onmicrosoft\\.com",
            tenants in prop::collection::vec(guid(), 1..8)
        ) {
            let accounts: Vec<Account> = tenants
                .iter()
                .map(|t| account(t, "shared@contoso.com"))
                .collect();

            // Property: with a domain-style tenant the first matching username wins
            let selected = select_account(&accounts, Some(tenant.as_str()), Some("SHARED@contoso.com"));
            prop_assert_eq!(selected, accounts.first());
        }

        #[test]
        fn test_username_match_ignores_case(user in "[a-z]{1,10}@[a-z]{1,10}\\.com") {
            let accounts = vec![account("t", &user)];
            let upper = user.to_uppercase();

            prop_assert!(select_account(&accounts, None, Some(upper.as_str())).is_some());
        }
    }
}

#[cfg(test)]
mod header_properties {
    use super::*;

    proptest! {
        #[test]
        fn test_strip_bearer_returns_token(token in "[A-Za-z0-9._-]{1,64}") {
            let header = format!("Bearer {token}");
            prop_assert_eq!(strip_bearer(&header), Some(token.as_str()));

            let lower = format!("bearer {token}");
            prop_assert_eq!(strip_bearer(&lower), Some(token.as_str()));
        }

        #[test]
        fn test_short_headers_yield_nothing(header in ".{0,7}") {
            prop_assume!(header.len() <= 7);
            prop_assert_eq!(strip_bearer(&header), None);
        }
    }
}

#[cfg(test)]
mod key_properties {
    use super::*;

    proptest! {
        #[test]
        fn test_cache_key_ignores_scope_order_and_case(
            scopes in prop::collection::vec("[A-Za-z]{1,8}\\.[A-Za-z]{1,8}", 1..6)
        ) {
            let mut reversed: Vec<String> = scopes.iter().rev().map(|s| s.to_uppercase()).collect();
            reversed.push(scopes[0].clone());

            prop_assert_eq!(
                TokenCacheKey::new(&scopes, Some("Tenant"), Some("User")),
                TokenCacheKey::new(&reversed, Some("tenant"), Some("user"))
            );
        }

        #[test]
        fn test_blank_scopes_are_rejected(blanks in prop::collection::vec("[ \t]{0,4}", 0..5)) {
            prop_assert!(InteractiveOptions::new(blanks).is_err());
        }
    }
}
