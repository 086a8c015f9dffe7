use regent::db::{self, modules};
use regent_manifest::{Catalog, ModuleDescriptor, ModuleState};
use sqlx::SqlitePool;
use tempfile::TempDir;

async fn setup_db(dir: &TempDir) -> SqlitePool {
    let url = format!("sqlite://{}", dir.path().join("modules.sqlite").display());
    let pool = db::connect(&url, 1).await.unwrap();
    let mut conn = pool.acquire().await.unwrap();
    db::initialize(&mut conn).await.unwrap();
    pool
}

fn catalog(modules: Vec<ModuleDescriptor>) -> Catalog {
    modules.into_iter().collect()
}

#[tokio::test]
async fn sync_catalog_inserts_new_modules_with_their_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    let pool = setup_db(&dir).await;
    let mut conn = pool.acquire().await.unwrap();

    let mut legacy = ModuleDescriptor::new("legacy");
    legacy.installable = false;
    let first = catalog(vec![
        ModuleDescriptor::new("base"),
        ModuleDescriptor::new("sale").depends_on(["base"]),
        ModuleDescriptor::new("crm").depends_on(["sale", "base"]),
        legacy,
    ]);

    let added = modules::sync_catalog(&mut conn, &first).await.unwrap();
    assert_eq!(added, 4);
    assert_eq!(modules::dependencies(&mut conn, "sale").await.unwrap(), ["base"]);
    assert_eq!(
        modules::dependencies(&mut conn, "crm").await.unwrap(),
        ["sale", "base"]
    );
    assert!(modules::dependencies(&mut conn, "base").await.unwrap().is_empty());

    let row = modules::get(&mut conn, "legacy").await.unwrap().unwrap();
    assert_eq!(row.state, ModuleState::Uninstallable);
    let row = modules::get(&mut conn, "sale").await.unwrap().unwrap();
    assert_eq!(row.state, ModuleState::Uninstalled);
}

#[tokio::test]
async fn sync_catalog_refreshes_existing_rows() {
    let dir = tempfile::tempdir().unwrap();
    let pool = setup_db(&dir).await;
    let mut conn = pool.acquire().await.unwrap();

    let mut legacy = ModuleDescriptor::new("legacy");
    legacy.installable = false;
    modules::sync_catalog(
        &mut conn,
        &catalog(vec![
            ModuleDescriptor::new("base"),
            ModuleDescriptor::new("sale").depends_on(["base"]),
            legacy,
        ]),
    )
    .await
    .unwrap();

    let added = modules::sync_catalog(
        &mut conn,
        &catalog(vec![
            ModuleDescriptor::new("base"),
            ModuleDescriptor::new("product").depends_on(["base"]),
            ModuleDescriptor::new("sale").depends_on(["base", "product"]),
            ModuleDescriptor::new("legacy"),
        ]),
    )
    .await
    .unwrap();

    assert_eq!(added, 1);
    assert_eq!(
        modules::dependencies(&mut conn, "sale").await.unwrap(),
        ["base", "product"]
    );
    let row = modules::get(&mut conn, "legacy").await.unwrap().unwrap();
    assert_eq!(row.state, ModuleState::Uninstalled);
}

#[tokio::test]
async fn transitions_only_apply_from_the_listed_states() {
    let dir = tempfile::tempdir().unwrap();
    let pool = setup_db(&dir).await;
    let mut conn = pool.acquire().await.unwrap();
    modules::sync_catalog(&mut conn, &catalog(vec![ModuleDescriptor::new("base")]))
        .await
        .unwrap();

    let moved = modules::transition(
        &mut conn,
        "base",
        &[ModuleState::Installed],
        ModuleState::ToRemove,
    )
    .await
    .unwrap();
    assert!(!moved);

    let moved = modules::transition(
        &mut conn,
        "base",
        &[ModuleState::Uninstalled],
        ModuleState::ToInstall,
    )
    .await
    .unwrap();
    assert!(moved);

    modules::mark_installed(&mut conn, "base", "1.0.1.0", false)
        .await
        .unwrap();
    let row = modules::get(&mut conn, "base").await.unwrap().unwrap();
    assert_eq!(row.state, ModuleState::Installed);
    assert_eq!(row.latest_version.as_deref(), Some("1.0.1.0"));

    assert!(
        !modules::transition(&mut conn, "ghost", &[ModuleState::Installed], ModuleState::ToUpgrade)
            .await
            .unwrap()
    );
}
