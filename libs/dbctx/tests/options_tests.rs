#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use common::{FakeFactory, ListProvider};
use dbctx::{
    ContextError, ContextOptions, CoreOptionsExtension, OptionsBuilder, ProviderSelector,
    RelationalOptionsExtension,
};

type FakeSql = RelationalOptionsExtension<FakeFactory>;

fn fake_sql(cs: &str) -> FakeSql {
    RelationalOptionsExtension::with_connection_string(FakeFactory::seeded(0), cs)
}

struct Orders;

#[test]
fn with_extension_leaves_receiver_untouched() {
    let base = Arc::new(ContextOptions::new().with_extension(CoreOptionsExtension::default()));
    let next = Arc::new(base.with_extension(fake_sql("db=a")));

    assert!(!Arc::ptr_eq(&base, &next));
    assert_eq!(base.len(), 1);
    assert!(base.has_extension::<CoreOptionsExtension>());
    assert!(!base.has_extension::<FakeSql>());
    assert_eq!(next.len(), 2);
    assert!(next.has_extension::<CoreOptionsExtension>());
}

#[test]
fn same_kind_twice_keeps_only_the_second() {
    let mut builder = OptionsBuilder::new(Arc::new(ContextOptions::new()));
    builder
        .add_or_update_extension(fake_sql("db=first"))
        .add_or_update_extension(fake_sql("db=second"));

    let options = builder.into_options();
    assert_eq!(options.len(), 1);
    assert_eq!(
        options.extension::<FakeSql>().unwrap().connection_string(),
        "db=second"
    );
}

#[test]
fn every_add_produces_a_new_snapshot() {
    let seed = Arc::new(ContextOptions::for_context::<Orders>());
    let mut builder = OptionsBuilder::new(Arc::clone(&seed));
    assert!(Arc::ptr_eq(&seed, builder.options()));

    builder.enable_detailed_errors();
    let after_core = Arc::clone(builder.options());
    assert!(!Arc::ptr_eq(&seed, &after_core));

    builder.enable_sensitive_data_logging();
    assert!(!Arc::ptr_eq(&after_core, builder.options()));

    // Earlier snapshots keep their own view.
    assert!(!after_core.core().sensitive_data_logging);
    assert!(after_core.core().detailed_errors);
    let core = builder.options().core();
    assert!(core.sensitive_data_logging && core.detailed_errors);

    // The tag survives copy-on-write.
    assert_eq!(
        builder.options().context_type(),
        seed.context_type()
    );
}

#[test]
fn describe_redacts_unless_sensitive_logging_is_enabled() {
    let mut builder = OptionsBuilder::new(Arc::new(ContextOptions::new()));
    builder.add_or_update_extension(fake_sql("Data Source=x;Password=hunter2"));
    assert!(!builder.options().describe().contains("hunter2"));

    builder.enable_sensitive_data_logging();
    assert!(builder.options().describe().contains("hunter2"));
}

#[test]
fn selector_reports_missing_provider() {
    let options = ContextOptions::for_context::<Orders>().with_extension(CoreOptionsExtension::default());
    let err = ProviderSelector::resolve(&options).unwrap_err();
    match err {
        ContextError::NoDataStoreConfigured { context } => assert_eq!(context, "Orders"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn selector_picks_the_single_provider() {
    let options = ContextOptions::new()
        .with_extension(CoreOptionsExtension::default())
        .with_extension(ListProvider::empty());
    let provider = ProviderSelector::resolve(&options).unwrap();
    assert_eq!(provider.provider_name(), "list");
}

#[test]
fn selector_rejects_two_providers() {
    let options = ContextOptions::new()
        .with_extension(fake_sql("db=a"))
        .with_extension(ListProvider::empty());
    let err = ProviderSelector::resolve(&options).unwrap_err();
    match err {
        ContextError::MultipleDataStoresConfigured { providers, .. } => {
            assert_eq!(providers, vec!["fake-sql", "list"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
