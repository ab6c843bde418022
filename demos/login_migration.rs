use anyhow::Context;
use tracing_subscriber::EnvFilter;
use wp_hash_compat::{
    upgrade_to_phc, Account, Hs256Signer, LoginConfig, LoginRequest, MigratingLoginFlow,
    SigningSecret, SqliteAccountStore,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let secret = std::env::var("WP_COMPAT_JWT_SECRET")
        .context("set WP_COMPAT_JWT_SECRET to a secret of at least 32 bytes")?;
    let config = LoginConfig::new(SigningSecret::new(secret)?).with_bcrypt_cost(4)?;

    // A customer imported from WordPress with their phpass hash
    let legacy_hash = "$P$Bxyz12345lwaflS6e/hYrKCY6TUOVg1";
    let store = SqliteAccountStore::in_memory()?;
    store.insert_account(&Account {
        id: "cus_01".into(),
        email: "jane@example.com".into(),
        first_name: Some("Jane".into()),
        last_name: Some("Doe".into()),
    })?;
    store.import_legacy_hash("cus_01", legacy_hash)?;

    println!("Legacy hash: {legacy_hash}");
    println!("As PHC:      {}", upgrade_to_phc(legacy_hash)?);

    let flow = MigratingLoginFlow::new(store, Hs256Signer, config);

    // First login verifies against phpass and moves the account to bcrypt
    let first = flow.login(&LoginRequest::new("Jane@Example.com", "secret123"))?;
    println!("First login:  {:?}", first.migration_notice);

    // From here on only the bcrypt credential is consulted
    let second = flow.login(&LoginRequest::new("jane@example.com", "secret123"))?;
    println!("Second login: {:?}", second.migration_notice);
    println!("{}", serde_json::to_string_pretty(&second)?);

    match flow.login(&LoginRequest::new("jane@example.com", "wrong")) {
        Ok(_) => println!("unexpected success"),
        Err(e) => println!("Wrong password: {} ({})", e.client_message(), e.status_code()),
    }

    Ok(())
}
