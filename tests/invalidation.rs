//! Invalidation engine behavior against a real in-memory store.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use vitrina::cache::{
    CacheConfig, CacheInvalidationService, CacheManager, CacheStore, ChangeType, MemoryCacheStore,
    keys,
};

const TTL: Duration = Duration::from_secs(600);

struct Harness {
    store: Arc<MemoryCacheStore>,
    service: CacheInvalidationService,
}

impl Harness {
    fn new() -> Self {
        let config = CacheConfig::default();
        let store = Arc::new(MemoryCacheStore::new(&config));
        let manager = Arc::new(CacheManager::new(&config, store.clone()));
        Self {
            store,
            service: CacheInvalidationService::new(manager),
        }
    }

    async fn seed(&self, keys: &[&str]) {
        for key in keys {
            self.store
                .set(key, Bytes::from_static(b"{}"), TTL)
                .await
                .expect("seed");
        }
    }

    async fn keys(&self) -> Vec<String> {
        let mut keys = self.store.keys().await.expect("keys");
        keys.sort();
        keys
    }

    async fn contains(&self, key: &str) -> bool {
        self.keys().await.iter().any(|candidate| candidate == key)
    }
}

const STOREFRONT: &[&str] = &[
    "product_s1_p1",
    "product_s1_p10",
    "product_s1_p2",
    "products_s1_20_first",
    "featured_products_s1_8",
    "search_products_s1_00000000000000ff",
    "product_handle_map_s1",
    "collection_s1_col42",
    "collection_s1_col42_page2",
    "collection_s1_col420",
    "collections_s1_20_first",
    "page_s1_about",
    "pages_s1",
    "pages_s1_/",
    "pages_s1_/products/shirt",
    "page_s1_product|shirt",
    "page_s1_collection|summer",
    "navigation_s1_main",
    "template_s1_layout/theme.liquid",
    "compiled_template_s1_layout/theme.liquid",
    "product_s2_p1",
    "pages_s2_/",
    "domain_shop.example.com",
];

#[tokio::test]
async fn repeated_invalidation_is_idempotent() {
    let once = Harness::new();
    let twice = Harness::new();
    once.seed(STOREFRONT).await;
    twice.seed(STOREFRONT).await;

    once.service
        .invalidate_cache(ChangeType::ProductUpdated, "s1", Some("p1"), None)
        .await;
    for _ in 0..2 {
        twice
            .service
            .invalidate_cache(ChangeType::ProductUpdated, "s1", Some("p1"), None)
            .await;
    }

    assert_eq!(once.keys().await, twice.keys().await);
    assert_eq!(twice.service.stats().total_invalidations, 2);
}

#[tokio::test]
async fn shared_file_paths_wipe_every_rendered_page() {
    for change in ChangeType::ALL {
        for path in ["layout/theme.liquid", "sections/footer.liquid"] {
            let harness = Harness::new();
            harness.seed(STOREFRONT).await;

            harness
                .service
                .invalidate_cache(change, "s1", None, Some(path))
                .await;

            let keys = harness.keys().await;
            assert!(
                !keys.iter().any(|key| key.starts_with("pages_s1_")),
                "{change} with {path} left rendered pages: {keys:?}"
            );
            assert!(harness.contains("pages_s2_/").await);
        }
    }
}

#[tokio::test]
async fn product_update_is_precise() {
    let harness = Harness::new();
    harness.seed(STOREFRONT).await;

    harness
        .service
        .invalidate_cache(ChangeType::ProductUpdated, "s1", Some("p1"), None)
        .await;

    assert!(!harness.contains(&keys::product_key("s1", "p1")).await);
    assert!(harness.contains(&keys::product_key("s1", "p2")).await);
    assert!(harness.contains(&keys::product_key("s1", "p10")).await);
    assert!(harness.contains(&keys::product_key("s2", "p1")).await);

    assert!(!harness.contains("products_s1_20_first").await);
    assert!(!harness.contains("featured_products_s1_8").await);
    assert!(!harness.contains("page_s1_product|shirt").await);
    assert!(!harness.contains("product_handle_map_s1").await);
    assert!(!harness.contains("collection_s1_col42").await);
}

#[tokio::test]
async fn unknown_change_type_is_a_noop() {
    let harness = Harness::new();
    harness.seed(STOREFRONT).await;
    let before = harness.keys().await;

    let report = harness
        .service
        .invalidate_cache_str("not_a_real_type", "s1", None, None)
        .await;

    assert!(report.is_none());
    assert_eq!(harness.keys().await, before);
    assert_eq!(harness.service.stats().total_invalidations, 0);
    assert_eq!(harness.service.stats().last_invalidation, None);
}

#[tokio::test]
async fn collection_deletion_purges_collection_family() {
    let harness = Harness::new();
    harness.seed(STOREFRONT).await;

    harness
        .service
        .invalidate_cache_str("collection_deleted", "s1", Some("col42"), None)
        .await
        .expect("known change type");

    assert!(!harness.contains("collection_s1_col42").await);
    assert!(!harness.contains("collection_s1_col42_page2").await);
    assert!(!harness.contains("collections_s1_20_first").await);
    assert!(!harness.contains("page_s1_collection|summer").await);

    assert!(harness.contains("collection_s1_col420").await);
    assert!(harness.contains("page_s1_product|shirt").await);
}

#[tokio::test]
async fn layout_change_cascades_despite_rule() {
    let harness = Harness::new();
    harness
        .seed(&["pages_store9_/", "pages_store9_/cart", "pages_store1_/"])
        .await;

    let report = harness
        .service
        .invalidate_cache(
            ChangeType::TemplateStoreUpdated,
            "store9",
            None,
            Some("layout/theme.liquid"),
        )
        .await;

    assert!(report.plan.page_cascade);
    assert_eq!(harness.keys().await, vec!["pages_store1_/".to_string()]);
}

#[tokio::test]
async fn template_path_targets_its_page_type() {
    let harness = Harness::new();
    harness
        .seed(&[
            "page_s1_product|shirt",
            "page_s1_product|hat",
            "page_s1_collection|summer",
        ])
        .await;

    harness
        .service
        .invalidate_cache(
            ChangeType::TemplateStoreUpdated,
            "s1",
            None,
            Some("templates/product.json"),
        )
        .await;

    assert_eq!(
        harness.keys().await,
        vec!["page_s1_collection|summer".to_string()]
    );
}

#[tokio::test]
async fn domain_update_removes_only_that_domain() {
    let harness = Harness::new();
    harness
        .seed(&["domain_shop.example.com", "domain_other.example.com"])
        .await;

    harness
        .service
        .invalidate_cache(ChangeType::DomainUpdated, "s1", Some("shop.example.com"), None)
        .await;

    assert_eq!(
        harness.keys().await,
        vec!["domain_other.example.com".to_string()]
    );
}

#[tokio::test]
async fn page_change_drops_that_page_and_the_list() {
    for change in [ChangeType::PageUpdated, ChangeType::PageDeleted] {
        let harness = Harness::new();
        harness.seed(STOREFRONT).await;
        harness.seed(&["page_s1_contact", "page_s2_about"]).await;

        harness
            .service
            .invalidate_cache(change, "s1", Some("about"), None)
            .await;

        assert!(!harness.contains(&keys::page_key("s1", "about")).await);
        assert!(!harness.contains(&keys::pages_key("s1")).await);

        assert!(harness.contains("page_s1_contact").await, "{change}");
        assert!(harness.contains("page_s2_about").await, "{change}");
        assert!(harness.contains("page_s1_product|shirt").await, "{change}");
        assert!(harness.contains("page_s1_collection|summer").await, "{change}");
        assert!(harness.contains("product_s1_p1").await, "{change}");
    }
}

#[tokio::test]
async fn snippet_path_wipes_rendered_pages_of_the_store() {
    let harness = Harness::new();
    harness.seed(STOREFRONT).await;

    let report = harness
        .service
        .invalidate_cache(
            ChangeType::DomainUpdated,
            "s1",
            None,
            Some("snippets/price.liquid"),
        )
        .await;

    assert!(!report.plan.page_cascade);
    let expected: Vec<String> = STOREFRONT
        .iter()
        .filter(|key| !key.starts_with("pages_s1_"))
        .map(|key| key.to_string())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    assert_eq!(harness.keys().await, expected);
}
