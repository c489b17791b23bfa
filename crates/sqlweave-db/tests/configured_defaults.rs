//! Behaviour that depends on the global settings.
//!
//! Settings can be configured once per process, so everything that needs
//! them lives in the single test below.

use std::sync::LazyLock;

use sqlweave_core::settings::{CipherSettings, Settings};
use sqlweave_core::SETTINGS;
use sqlweave_db::cipher::{CipherSpec, FieldCipher, KeySize};
use sqlweave_db::dialect::Dialect;
use sqlweave_db::entity::{ColumnDef, ColumnKind, Entity, EntityMeta};
use sqlweave_db::query::{Expr, Query};

const DEFAULT_KEY: &str = "configured-default-key";

struct Account;

impl Entity for Account {
    fn meta() -> &'static EntityMeta {
        static META: LazyLock<EntityMeta> = LazyLock::new(|| {
            EntityMeta::new("Account", "Account")
                .column(ColumnDef::new("Id", ColumnKind::Int).primary_key())
                .column(
                    ColumnDef::new("Iban", ColumnKind::String)
                        .encrypted(CipherSpec::configured_default()),
                )
        });
        &META
    }
}

#[test]
fn test_configured_defaults() {
    SETTINGS.configure(Settings {
        default_dialect: "postgresql".to_string(),
        cipher: CipherSettings {
            default_key: DEFAULT_KEY.to_string(),
            key_size: 256,
        },
        ..Default::default()
    });

    // Blank annotation key falls back to the configured default and size.
    let spec = CipherSpec::configured_default();
    assert_eq!(spec.key_size, KeySize::Key256);
    let cipher = FieldCipher::from_spec(&spec).unwrap();
    let direct = FieldCipher::new(DEFAULT_KEY, KeySize::Key256).unwrap();
    assert_eq!(cipher.encrypt_str("NO93").unwrap(), direct.encrypt_str("NO93").unwrap());

    // Queries without an explicit dialect use the configured one.
    let compiled = Query::<Account>::new()
        .filter(Expr::member("Iban").equals(Expr::value("NO93")))
        .compile_default()
        .unwrap();
    assert_eq!(compiled.dialect(), Dialect::PostgreSql);
    let expected = direct.encrypt_str("NO93").unwrap();
    assert_eq!(
        compiled.where_sql().unwrap(),
        format!("(Account.\"Iban\" = '{expected}')")
    );
}
