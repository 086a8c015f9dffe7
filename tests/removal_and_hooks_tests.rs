mod common;

use async_trait::async_trait;
use common::{Fixture, count, module_state};
use regent::error::HookError;
use regent::loader::{HookContext, Phase};
use regent::{HookRegistry, LoadRequest, ModuleHook, ModuleOutcome, RegentError};
use std::sync::{Arc, Mutex};

struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ModuleHook for Recorder {
    async fn run(&self, ctx: HookContext<'_>) -> Result<(), HookError> {
        self.calls.lock().unwrap().push(ctx.module.to_string());
        Ok(())
    }
}

struct SeedPartner;

#[async_trait]
impl ModuleHook for SeedPartner {
    async fn run(&self, ctx: HookContext<'_>) -> Result<(), HookError> {
        if !ctx.models.contains_key("res.partner") {
            return Err("res.partner is not loaded".into());
        }
        sqlx::query("INSERT INTO res_partner (name) VALUES ('seeded')")
            .execute(&mut *ctx.conn)
            .await?;
        Ok(())
    }
}

struct Refuse;

#[async_trait]
impl ModuleHook for Refuse {
    async fn run(&self, _ctx: HookContext<'_>) -> Result<(), HookError> {
        Err("refused".into())
    }
}

const PARTNER_MODEL: &str = r#"
[[models]]
name = "res.partner"

[[models.fields]]
name = "name"
type = "char"
"#;

fn sales_fixture() -> Fixture {
    let fx = Fixture::new();
    fx.module("base", &format!("data = [\"data/base.toml\"]\n{PARTNER_MODEL}"));
    fx.file(
        "base",
        "data/base.toml",
        "[[record]]\nid = \"main_partner\"\nmodel = \"res.partner\"\n\n[record.values]\nname = \"Main\"\n",
    );
    fx.module(
        "sale",
        r#"
depends = ["base"]
data = ["data/orders.toml"]
uninstall_hook = "uninstall_recorder"

[[models]]
name = "sale.order"

[[models.fields]]
name = "name"
type = "char"

[[models.fields]]
name = "partner_id"
type = "many2one"
comodel = "res.partner"
"#,
    );
    fx.file(
        "sale",
        "data/orders.toml",
        "[[record]]\nid = \"order_1\"\nmodel = \"sale.order\"\n\n[record.values]\nname = \"SO1\"\npartner_id = { ref = \"base.main_partner\" }\n",
    );
    fx.module(
        "crm",
        r#"
depends = ["sale"]
uninstall_hook = "uninstall_recorder"

[[models]]
name = "res.partner"
extend = true

[[models.fields]]
name = "lead_score"
type = "integer"
"#,
    );
    fx
}

#[tokio::test]
async fn removal_runs_in_reverse_dependency_order() {
    let fx = sales_fixture();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut hooks = HookRegistry::new();
    hooks.register(
        "uninstall_recorder",
        Arc::new(Recorder {
            calls: Arc::clone(&calls),
        }),
    );
    let cache = fx.cache().with_hooks(hooks);

    let (registry, _) = cache
        .new_registry("removal", &LoadRequest::new().install(["crm"]))
        .await
        .unwrap();
    assert!(registry.model("res.partner").unwrap().field("lead_score").is_some());
    assert_eq!(count(registry.pool(), "sale_order").await, 1);

    let (registry, report) = cache
        .new_registry("removal", &LoadRequest::new().remove(["sale"]))
        .await
        .unwrap();

    assert_eq!(*calls.lock().unwrap(), ["crm", "sale"]);
    assert_eq!(report.outcome("crm"), Some(&ModuleOutcome::Removed));
    assert_eq!(report.outcome("sale"), Some(&ModuleOutcome::Removed));
    assert_eq!(report.outcome("base"), Some(&ModuleOutcome::Loaded));
    assert!(report.signaled);

    let pool = registry.pool();
    assert_eq!(module_state(pool, "sale").await.as_deref(), Some("uninstalled"));
    assert_eq!(module_state(pool, "crm").await.as_deref(), Some("uninstalled"));
    assert_eq!(module_state(pool, "base").await.as_deref(), Some("installed"));
    assert_eq!(count(pool, "sale_order").await, 0);
    assert_eq!(count(pool, "res_partner").await, 1);

    assert_eq!(registry.loaded_modules(), ["base"]);
    assert!(!registry.contains_model("sale.order"));
    assert!(registry.model("res.partner").unwrap().field("lead_score").is_none());
}

#[tokio::test]
async fn failing_uninstall_hook_aborts_the_removal() {
    let fx = sales_fixture();
    let mut hooks = HookRegistry::new();
    hooks.register("uninstall_recorder", Arc::new(Refuse));
    let cache = fx.cache().with_hooks(hooks);

    cache
        .new_registry("refuse", &LoadRequest::new().install(["sale"]))
        .await
        .unwrap();
    let err = cache
        .new_registry("refuse", &LoadRequest::new().remove(["sale"]))
        .await
        .unwrap_err();

    let RegentError::BuildFailed { source, .. } = err else {
        panic!("expected a build failure");
    };
    assert!(matches!(*source, RegentError::UninstallFailed { ref module, .. } if module == "sale"));
}

#[tokio::test]
async fn plain_reload_after_refused_uninstall_keeps_the_module() {
    let fx = sales_fixture();
    let mut hooks = HookRegistry::new();
    hooks.register("uninstall_recorder", Arc::new(Refuse));
    let cache = fx.cache().with_hooks(hooks);

    cache
        .new_registry("refuse_reload", &LoadRequest::new().install(["sale"]))
        .await
        .unwrap();
    cache
        .new_registry("refuse_reload", &LoadRequest::new().remove(["sale"]))
        .await
        .unwrap_err();

    let registry = cache.get_or_build("refuse_reload").await.unwrap();

    assert!(registry.contains_model("sale.order"));
    assert_eq!(registry.loaded_modules(), ["base", "sale"]);
    let pool = registry.pool();
    assert_eq!(module_state(pool, "sale").await.as_deref(), Some("to_remove"));
    assert_eq!(count(pool, "sale_order").await, 1);
}

#[tokio::test]
async fn missing_uninstall_hook_is_fatal() {
    let fx = sales_fixture();
    let cache = fx.cache();

    cache
        .new_registry("nohook", &LoadRequest::new().install(["sale"]))
        .await
        .unwrap();
    let err = cache
        .new_registry("nohook", &LoadRequest::new().remove(["sale"]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("uninstall_recorder"));
}

#[tokio::test]
async fn post_init_hook_sees_the_module_tables() {
    let fx = Fixture::new();
    fx.module("base", &format!("post_init_hook = \"seed\"\n{PARTNER_MODEL}"));
    let mut hooks = HookRegistry::new();
    hooks.register("seed", Arc::new(SeedPartner));
    let cache = fx.cache().with_hooks(hooks);

    let (registry, report) = cache
        .new_registry("seed", &LoadRequest::new().install(["base"]))
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(count(registry.pool(), "res_partner").await, 1);
}

#[tokio::test]
async fn unregistered_pre_init_hook_fails_the_module() {
    let fx = Fixture::new();
    fx.module("base", &format!("pre_init_hook = \"nowhere\"\n{PARTNER_MODEL}"));
    let cache = fx.cache();

    let (registry, report) = cache
        .new_registry("prehook", &LoadRequest::new().install(["base"]))
        .await
        .unwrap();

    assert!(matches!(
        report.outcome("base"),
        Some(ModuleOutcome::Failed { phase: Phase::PreInit, .. })
    ));
    assert!(!registry.contains_model("res.partner"));
    assert_eq!(module_state(registry.pool(), "base").await.as_deref(), Some("uninstalled"));
}
