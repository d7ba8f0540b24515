//! Cache key namespace.
//!
//! Every key or prefix that the manager, the invalidation engine or a render
//! path touches is built here. Components never concatenate raw key strings
//! on their own, so a key shape changes in exactly one function.

// ============================================================================
// Products
// ============================================================================

/// Exact key for a single product record.
pub fn product_key(store_id: &str, product_id: &str) -> String {
    format!("product_{store_id}_{product_id}")
}

/// Prefix covering every single-product entry of a store.
pub fn product_store_prefix(store_id: &str) -> String {
    format!("product_{store_id}_")
}

/// Key for a paginated product list.
pub fn products_key(store_id: &str, limit: u32, next_token: Option<&str>) -> String {
    format!("products_{store_id}_{limit}_{}", next_token.unwrap_or("first"))
}

/// Prefix covering all product list pages of a store.
pub fn products_prefix(store_id: &str) -> String {
    format!("products_{store_id}_")
}

/// Key for a featured-products slice.
pub fn featured_products_key(store_id: &str, limit: u32) -> String {
    format!("featured_products_{store_id}_{limit}")
}

pub fn featured_products_prefix(store_id: &str) -> String {
    format!("featured_products_{store_id}_")
}

/// Key for a product search result page.
pub fn search_products_key(store_id: &str, query_hash: u64) -> String {
    format!("search_products_{store_id}_{query_hash:016x}")
}

pub fn search_products_prefix(store_id: &str) -> String {
    format!("search_products_{store_id}_")
}

/// Handle → id lookup table of a store.
pub fn product_handle_map_key(store_id: &str) -> String {
    format!("product_handle_map_{store_id}")
}

// ============================================================================
// Collections
// ============================================================================

/// Exact key for a collection record.
pub fn collection_key(store_id: &str, collection_id: &str) -> String {
    format!("collection_{store_id}_{collection_id}")
}

/// Key for a variant of a collection (e.g. one page of its product listing).
pub fn collection_variant_key(store_id: &str, collection_id: &str, variant: &str) -> String {
    format!("collection_{store_id}_{collection_id}_{variant}")
}

/// Prefix covering every variant of one collection.
pub fn collection_prefix(store_id: &str, collection_id: &str) -> String {
    format!("collection_{store_id}_{collection_id}_")
}

/// Prefix covering every collection entry of a store.
pub fn collection_store_prefix(store_id: &str) -> String {
    format!("collection_{store_id}_")
}

pub fn collections_key(store_id: &str, limit: u32, next_token: Option<&str>) -> String {
    format!(
        "collections_{store_id}_{limit}_{}",
        next_token.unwrap_or("first")
    )
}

pub fn collections_prefix(store_id: &str) -> String {
    format!("collections_{store_id}_")
}

// ============================================================================
// Pages
// ============================================================================

/// Exact key for a content page record.
pub fn page_key(store_id: &str, page_id: &str) -> String {
    format!("page_{store_id}_{page_id}")
}

/// Exact key for the list of content pages of a store.
pub fn pages_key(store_id: &str) -> String {
    format!("pages_{store_id}")
}

/// Key for a rendered HTML page addressed by request path.
pub fn rendered_page_key(store_id: &str, request_path: &str) -> String {
    format!("pages_{store_id}_{request_path}")
}

/// Prefix covering every rendered HTML page of a store.
pub fn rendered_pages_prefix(store_id: &str) -> String {
    format!("pages_{store_id}_")
}

/// Key for a rendered page of a given template type (`product`, `collection`, ...).
pub fn typed_page_key(store_id: &str, page_type: &str, handle: &str) -> String {
    format!("page_{store_id}_{page_type}|{handle}")
}

/// Prefix covering the rendered pages of one template type.
pub fn typed_pages_prefix(store_id: &str, page_type: &str) -> String {
    format!("page_{store_id}_{page_type}|")
}

// ============================================================================
// Navigation
// ============================================================================

pub fn navigation_key(store_id: &str, handle: &str) -> String {
    format!("navigation_{store_id}_{handle}")
}

pub fn navigation_prefix(store_id: &str) -> String {
    format!("navigation_{store_id}_")
}

pub fn navigation_menu_key(store_id: &str, menu_id: &str) -> String {
    format!("navigation_menu_{store_id}_{menu_id}")
}

pub fn navigation_menu_prefix(store_id: &str) -> String {
    format!("navigation_menu_{store_id}_")
}

// ============================================================================
// Templates
// ============================================================================

/// Raw template source, keyed by logical template name (`layout/theme.liquid`).
pub fn template_key(store_id: &str, template_name: &str) -> String {
    format!("template_{store_id}_{template_name}")
}

pub fn template_prefix(store_id: &str) -> String {
    format!("template_{store_id}_")
}

pub fn compiled_template_key(store_id: &str, template_name: &str) -> String {
    format!("compiled_template_{store_id}_{template_name}")
}

pub fn compiled_template_prefix(store_id: &str) -> String {
    format!("compiled_template_{store_id}_")
}

// ============================================================================
// Domains
// ============================================================================

/// Domain resolution entry. Keyed by host name, not by store.
pub fn domain_key(domain: &str) -> String {
    format!("domain_{domain}")
}

// ============================================================================
// Store scope
// ============================================================================

/// Infix present in every store-scoped key.
pub fn store_scope_infix(store_id: &str) -> String {
    format!("_{store_id}_")
}

/// Suffix of store-scoped keys that end with the store id (`pages_{store}`).
pub fn store_scope_suffix(store_id: &str) -> String {
    format!("_{store_id}")
}

/// Whether a key belongs to the given store.
pub fn is_store_scoped(key: &str, store_id: &str) -> bool {
    key.contains(&store_scope_infix(store_id)) || key.ends_with(&store_scope_suffix(store_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_deterministic() {
        assert_eq!(product_key("s1", "p1"), product_key("s1", "p1"));
        assert_eq!(product_key("s1", "p1"), "product_s1_p1");
        assert_eq!(pages_key("s1"), "pages_s1");
        assert_eq!(domain_key("shop.example.com"), "domain_shop.example.com");
    }

    #[test]
    fn list_keys_fall_under_their_prefix() {
        assert!(products_key("s1", 20, None).starts_with(&products_prefix("s1")));
        assert!(collections_key("s1", 20, Some("abc")).starts_with(&collections_prefix("s1")));
        assert!(
            featured_products_key("s1", 8).starts_with(&featured_products_prefix("s1"))
        );
        assert!(search_products_key("s1", 42).starts_with(&search_products_prefix("s1")));
        assert!(rendered_page_key("s1", "/").starts_with(&rendered_pages_prefix("s1")));
    }

    #[test]
    fn pages_list_key_is_not_a_rendered_page() {
        assert!(!pages_key("s1").starts_with(&rendered_pages_prefix("s1")));
    }

    #[test]
    fn typed_page_prefix_is_scoped_to_type() {
        let product_page = typed_page_key("s1", "product", "red-shirt");
        let collection_page = typed_page_key("s1", "collection", "summer");

        assert!(product_page.starts_with(&typed_pages_prefix("s1", "product")));
        assert!(!collection_page.starts_with(&typed_pages_prefix("s1", "product")));
    }

    #[test]
    fn collection_prefix_does_not_leak_into_sibling_ids() {
        let variant = collection_variant_key("s1", "col4", "page2");
        let sibling = collection_variant_key("s1", "col42", "page2");

        assert!(variant.starts_with(&collection_prefix("s1", "col4")));
        assert!(!sibling.starts_with(&collection_prefix("s1", "col4")));
    }

    #[test]
    fn store_scope_matches_infix_and_suffix() {
        assert!(is_store_scoped(&product_key("s1", "p1"), "s1"));
        assert!(is_store_scoped(&pages_key("s1"), "s1"));
        assert!(!is_store_scoped(&product_key("s10", "p1"), "s1"));
        assert!(!is_store_scoped(&domain_key("s1.example.com"), "s1"));
    }
}
