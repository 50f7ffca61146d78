//! End-to-end resolution scenarios.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use stat_core::{
    Actor, ActorId, Bucket, CapContribution, CapKind, CapMode, CombinerRule, Contribution,
    RoundingPolicy, RuleTable,
};
use stat_runtime::{
    CacheConfig, ResolveContext, ResolveError, Resolver, ResolverBuilder, Subsystem,
    SubsystemOutput,
};

fn cache_config(dir: &TempDir) -> CacheConfig {
    CacheConfig {
        mapped_path: dir.path().join("snapshots.map"),
        durable_dir: dir.path().join("durable"),
        flush_interval: Duration::from_millis(50),
        ..CacheConfig::default()
    }
}

fn build_resolver(dir: &TempDir) -> Resolver {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    ResolverBuilder::new()
        .with_cache_config(cache_config(dir))
        .build()
        .expect("resolver should build")
}

/// Subsystem returning fixed contributions, counting its calls.
struct StaticSubsystem {
    id: &'static str,
    priority: i64,
    primary: Vec<Contribution>,
    caps: Vec<CapContribution>,
    calls: Arc<AtomicU32>,
}

impl StaticSubsystem {
    fn new(id: &'static str, priority: i64) -> Self {
        Self {
            id,
            priority,
            primary: Vec::new(),
            caps: Vec::new(),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    fn with_primary(mut self, contribution: Contribution) -> Self {
        self.primary.push(contribution);
        self
    }

    fn with_cap(mut self, cap: CapContribution) -> Self {
        self.caps.push(cap);
        self
    }

    fn call_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Subsystem for StaticSubsystem {
    fn system_id(&self) -> &str {
        self.id
    }

    fn priority(&self) -> i64 {
        self.priority
    }

    async fn contribute(
        &self,
        _actor: &Actor,
        _ctx: &ResolveContext,
    ) -> stat_runtime::Result<SubsystemOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut output = SubsystemOutput::new();
        output.primary = self.primary.clone();
        output.caps = self.caps.clone();
        Ok(output)
    }
}

/// Subsystem that always fails.
struct FailingSubsystem;

#[async_trait]
impl Subsystem for FailingSubsystem {
    fn system_id(&self) -> &str {
        "broken"
    }

    fn priority(&self) -> i64 {
        50
    }

    async fn contribute(
        &self,
        _actor: &Actor,
        _ctx: &ResolveContext,
    ) -> stat_runtime::Result<SubsystemOutput> {
        Err(ResolveError::Subsystem {
            system: "broken".to_string(),
            message: "database offline".to_string(),
        })
    }
}

#[tokio::test]
async fn two_additive_subsystems_compose() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = build_resolver(&dir);
    resolver
        .plugins()
        .register_enabled(Arc::new(StaticSubsystem::new("equipment", 100).with_primary(
            Contribution::new("power", Bucket::Additive, 10.0, "equipment"),
        )))
        .unwrap();
    resolver
        .plugins()
        .register_enabled(Arc::new(StaticSubsystem::new("buffs", 90).with_primary(
            Contribution::new("power", Bucket::Additive, 15.0, "buffs"),
        )))
        .unwrap();

    let actor = Actor::new(ActorId::new(1));
    let snapshot = resolver.resolve(&actor).await.unwrap();

    assert_eq!(snapshot.primary("power"), Some(25.0));
    assert!(!snapshot.degraded);
    assert_eq!(
        snapshot.subsystems_processed,
        vec!["buffs".to_string(), "equipment".to_string()]
    );
}

#[tokio::test]
async fn multiplicative_bonus_applies_to_base() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = build_resolver(&dir);
    resolver
        .plugins()
        .register_enabled(Arc::new(StaticSubsystem::new("leveling", 100).with_primary(
            Contribution::new("power", Bucket::Additive, 100.0, "leveling"),
        )))
        .unwrap();
    resolver
        .plugins()
        .register_enabled(Arc::new(StaticSubsystem::new("guild", 90).with_primary(
            Contribution::new("power", Bucket::Multiplicative, 0.2, "guild"),
        )))
        .unwrap();

    let actor = Actor::new(ActorId::new(2));
    let snapshot = resolver.resolve(&actor).await.unwrap();

    assert_eq!(snapshot.primary("power"), Some(120.0));
}

#[tokio::test]
async fn percent_raised_cap_clamps_composed_value() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = build_resolver(&dir);
    resolver
        .plugins()
        .register_enabled(Arc::new(
            StaticSubsystem::new("leveling", 100)
                .with_primary(Contribution::new("speed", Bucket::Additive, 150.0, "leveling"))
                .with_cap(CapContribution::new(
                    "leveling",
                    "speed",
                    CapMode::Min,
                    CapKind::Absolute,
                    0.0,
                    "base",
                ))
                .with_cap(CapContribution::new(
                    "leveling",
                    "speed",
                    CapMode::Max,
                    CapKind::Absolute,
                    100.0,
                    "base",
                )),
        ))
        .unwrap();
    resolver
        .plugins()
        .register_enabled(Arc::new(StaticSubsystem::new("equipment", 90).with_cap(
            CapContribution::new(
                "equipment",
                "speed",
                CapMode::Max,
                CapKind::PercentAdditive,
                20.0,
                "equipment",
            ),
        )))
        .unwrap();

    let actor = Actor::new(ActorId::new(3));
    let snapshot = resolver.resolve(&actor).await.unwrap();

    let caps = snapshot.caps("speed").expect("speed should be capped");
    assert_eq!(caps.min, 0.0);
    assert_eq!(caps.max, 120.0);
    assert_eq!(snapshot.primary("speed"), Some(120.0));
}

#[tokio::test]
async fn second_resolve_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = build_resolver(&dir);

    let subsystem = StaticSubsystem::new("equipment", 100).with_primary(Contribution::new(
        "power",
        Bucket::Additive,
        10.0,
        "equipment",
    ));
    let calls = subsystem.call_counter();
    resolver.plugins().register_enabled(Arc::new(subsystem)).unwrap();

    let actor = Actor::new(ActorId::new(4));
    let first = resolver.resolve(&actor).await.unwrap();
    let second = resolver.resolve(&actor).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "cache hit must not invoke subsystems");

    let metrics = resolver.get_metrics();
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.cache_misses, 1);
    assert_eq!(metrics.total_resolutions, 2);
}

/// Blocks its first contribution call until released, so the test can
/// mutate the actor mid-pass.
struct GatedSubsystem {
    entered: Arc<Notify>,
    release: Arc<Notify>,
    gate_used: AtomicBool,
}

#[async_trait]
impl Subsystem for GatedSubsystem {
    fn system_id(&self) -> &str {
        "gated"
    }

    fn priority(&self) -> i64 {
        10
    }

    async fn contribute(
        &self,
        _actor: &Actor,
        _ctx: &ResolveContext,
    ) -> stat_runtime::Result<SubsystemOutput> {
        if !self.gate_used.swap(true, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let mut output = SubsystemOutput::new();
        output.add_primary(Contribution::new("power", Bucket::Additive, 5.0, "gated"));
        Ok(output)
    }
}

#[tokio::test]
async fn version_bump_discards_inflight_pass() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Arc::new(build_resolver(&dir));

    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    resolver
        .plugins()
        .register_enabled(Arc::new(GatedSubsystem {
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
            gate_used: AtomicBool::new(false),
        }))
        .unwrap();

    let actor = Actor::new(ActorId::new(5));
    let inflight = tokio::spawn({
        let resolver = Arc::clone(&resolver);
        let actor = actor.clone();
        async move { resolver.resolve(&actor).await }
    });

    // Wait until the pass is inside the subsystem call, then mutate the
    // actor out from under it.
    entered.notified().await;
    resolver.invalidate_cache(actor.id).await;
    release.notify_one();

    let stale = inflight.await.unwrap().unwrap();
    assert_eq!(stale.version, 1, "pass keeps the version it observed");

    // The stale result was never cached; the next resolve recomputes
    // against the advanced version.
    assert!(resolver.get_cached_snapshot(actor.id).await.is_none());
    let fresh = resolver.resolve(&actor).await.unwrap();
    assert_eq!(fresh.version, 2);
}

#[tokio::test]
async fn failing_subsystem_is_isolated_and_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = build_resolver(&dir);
    resolver.plugins().register_enabled(Arc::new(FailingSubsystem)).unwrap();
    resolver
        .plugins()
        .register_enabled(Arc::new(StaticSubsystem::new("equipment", 100).with_primary(
            Contribution::new("power", Bucket::Additive, 10.0, "equipment"),
        )))
        .unwrap();

    let actor = Actor::new(ActorId::new(6));
    let snapshot = resolver.resolve(&actor).await.unwrap();

    assert!(snapshot.degraded);
    assert_eq!(snapshot.failed_subsystems, 1);
    assert_eq!(snapshot.primary("power"), Some(10.0), "successful contribution survives");
    assert_eq!(snapshot.subsystems_processed, vec!["equipment".to_string()]);
}

#[tokio::test]
async fn zero_subsystems_is_degraded_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = build_resolver(&dir);

    let actor = Actor::new(ActorId::new(7));
    let snapshot = resolver.resolve(&actor).await.unwrap();

    assert!(snapshot.degraded);
    assert!(snapshot.primary.is_empty());
}

#[tokio::test]
async fn lifecycle_controls_contribution_visibility() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = build_resolver(&dir);
    resolver
        .plugins()
        .register_enabled(Arc::new(StaticSubsystem::new("equipment", 100).with_primary(
            Contribution::new("power", Bucket::Additive, 10.0, "equipment"),
        )))
        .unwrap();

    let actor = Actor::new(ActorId::new(8));
    assert_eq!(resolver.resolve(&actor).await.unwrap().primary("power"), Some(10.0));

    resolver.plugins().disable("equipment").unwrap();
    resolver.invalidate_cache(actor.id).await;
    let disabled = resolver.resolve(&actor).await.unwrap();
    assert!(disabled.primary.is_empty());

    resolver.plugins().enable("equipment").unwrap();
    resolver.invalidate_cache(actor.id).await;
    let enabled = resolver.resolve(&actor).await.unwrap();
    assert_eq!(enabled.primary("power"), Some(10.0));

    resolver.plugins().unregister("equipment").unwrap();
    assert!(!resolver.plugins().is_registered("equipment"));
}

/// Poisons one actor's composition with a non-finite contribution.
struct PoisonSubsystem;

#[async_trait]
impl Subsystem for PoisonSubsystem {
    fn system_id(&self) -> &str {
        "poison"
    }

    fn priority(&self) -> i64 {
        10
    }

    async fn contribute(
        &self,
        actor: &Actor,
        _ctx: &ResolveContext,
    ) -> stat_runtime::Result<SubsystemOutput> {
        let mut output = SubsystemOutput::new();
        let value = if actor.tags.contains_key("poisoned") {
            f64::NAN
        } else {
            10.0
        };
        output.add_primary(Contribution::new("power", Bucket::Additive, value, "poison"));
        Ok(output)
    }
}

#[tokio::test]
async fn batch_isolates_per_actor_failures() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = build_resolver(&dir);
    resolver.plugins().register_enabled(Arc::new(PoisonSubsystem)).unwrap();

    let clean = Actor::new(ActorId::new(9));
    let mut poisoned = Actor::new(ActorId::new(10));
    poisoned.tags.insert("poisoned".to_string(), "true".to_string());

    // A deterministic computation error surfaces to the direct caller...
    assert!(matches!(
        resolver.resolve(&poisoned).await,
        Err(ResolveError::Compose(_))
    ));

    // ...but never aborts a batch.
    let snapshots = resolver.resolve_batch(&[clean.clone(), poisoned]).await;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].actor_id, clean.id);

    assert!(resolver.get_metrics().error_count >= 1);
}

#[tokio::test]
async fn rounding_rule_applies_after_clamping() {
    let dir = tempfile::tempdir().unwrap();
    let rules = RuleTable::new().with_rule(
        "power",
        CombinerRule::new().with_rounding(RoundingPolicy::Integer),
    );
    let resolver = ResolverBuilder::new()
        .with_cache_config(cache_config(&dir))
        .with_rules(rules)
        .build()
        .unwrap();

    resolver
        .plugins()
        .register_enabled(Arc::new(
            StaticSubsystem::new("leveling", 100)
                .with_primary(Contribution::new("power", Bucket::Additive, 10.0, "leveling"))
                .with_primary(Contribution::new(
                    "power",
                    Bucket::Multiplicative,
                    0.25,
                    "leveling",
                )),
        ))
        .unwrap();

    let actor = Actor::new(ActorId::new(11));
    let snapshot = resolver.resolve(&actor).await.unwrap();

    // 10 × 1.25 = 12.5, rounded to 13
    assert_eq!(snapshot.primary("power"), Some(13.0));
}

#[tokio::test]
async fn rule_reload_affects_passes_started_afterwards() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = build_resolver(&dir);
    resolver
        .plugins()
        .register_enabled(Arc::new(
            StaticSubsystem::new("leveling", 100)
                .with_primary(Contribution::new("power", Bucket::Additive, 10.0, "leveling"))
                .with_primary(Contribution::new(
                    "power",
                    Bucket::Multiplicative,
                    0.25,
                    "leveling",
                )),
        ))
        .unwrap();

    let actor = Actor::new(ActorId::new(12));
    assert_eq!(resolver.resolve(&actor).await.unwrap().primary("power"), Some(12.5));

    resolver
        .combiner()
        .set_rule("power", CombinerRule::new().with_rounding(RoundingPolicy::Integer))
        .unwrap();
    resolver.invalidate_cache(actor.id).await;

    assert_eq!(resolver.resolve(&actor).await.unwrap().primary("power"), Some(13.0));
}

#[tokio::test]
async fn realm_scoped_caps_follow_the_context() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = build_resolver(&dir);
    resolver
        .plugins()
        .register_enabled(Arc::new(
            StaticSubsystem::new("leveling", 100)
                .with_primary(Contribution::new("power", Bucket::Additive, 150.0, "leveling"))
                .with_cap(
                    CapContribution::new(
                        "arena-rules",
                        "power",
                        CapMode::Max,
                        CapKind::Absolute,
                        100.0,
                        "base",
                    )
                    .with_realm("arena"),
                ),
        ))
        .unwrap();

    let actor = Actor::new(ActorId::new(13));
    let open_world = resolver.resolve(&actor).await.unwrap();
    assert_eq!(open_world.primary("power"), Some(150.0));

    let arena = resolver
        .resolve_with_context(&actor, ResolveContext::new().with_realm("arena"))
        .await
        .unwrap();
    assert_eq!(arena.primary("power"), Some(100.0));
}
