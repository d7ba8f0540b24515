//! Invalidation rules.
//!
//! Maps every [`ChangeType`] to the ordered cache families it affects. The
//! table is a `match`, so adding a change type without a rule fails to compile.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content mutation that may leave cached artifacts stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    ProductCreated,
    ProductUpdated,
    ProductDeleted,
    CollectionCreated,
    CollectionUpdated,
    CollectionDeleted,
    PageCreated,
    PageUpdated,
    PageDeleted,
    NavigationUpdated,
    TemplateUpdated,
    StoreSettingsUpdated,
    DomainUpdated,
    /// A file of a store's deployed template tree was written or removed.
    TemplateStoreUpdated,
}

impl ChangeType {
    pub const ALL: [ChangeType; 14] = [
        ChangeType::ProductCreated,
        ChangeType::ProductUpdated,
        ChangeType::ProductDeleted,
        ChangeType::CollectionCreated,
        ChangeType::CollectionUpdated,
        ChangeType::CollectionDeleted,
        ChangeType::PageCreated,
        ChangeType::PageUpdated,
        ChangeType::PageDeleted,
        ChangeType::NavigationUpdated,
        ChangeType::TemplateUpdated,
        ChangeType::StoreSettingsUpdated,
        ChangeType::DomainUpdated,
        ChangeType::TemplateStoreUpdated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::ProductCreated => "product_created",
            ChangeType::ProductUpdated => "product_updated",
            ChangeType::ProductDeleted => "product_deleted",
            ChangeType::CollectionCreated => "collection_created",
            ChangeType::CollectionUpdated => "collection_updated",
            ChangeType::CollectionDeleted => "collection_deleted",
            ChangeType::PageCreated => "page_created",
            ChangeType::PageUpdated => "page_updated",
            ChangeType::PageDeleted => "page_deleted",
            ChangeType::NavigationUpdated => "navigation_updated",
            ChangeType::TemplateUpdated => "template_updated",
            ChangeType::StoreSettingsUpdated => "store_settings_updated",
            ChangeType::DomainUpdated => "domain_updated",
            ChangeType::TemplateStoreUpdated => "template_store_updated",
        }
    }

    /// Family the entity id of this change identifies, if any.
    pub fn subject(self) -> Option<PatternTag> {
        match self {
            ChangeType::ProductCreated | ChangeType::ProductUpdated | ChangeType::ProductDeleted => {
                Some(PatternTag::Product)
            }
            ChangeType::CollectionCreated
            | ChangeType::CollectionUpdated
            | ChangeType::CollectionDeleted => Some(PatternTag::Collection),
            ChangeType::PageCreated | ChangeType::PageUpdated | ChangeType::PageDeleted => {
                Some(PatternTag::Page)
            }
            ChangeType::StoreSettingsUpdated | ChangeType::DomainUpdated => Some(PatternTag::Domain),
            ChangeType::NavigationUpdated
            | ChangeType::TemplateUpdated
            | ChangeType::TemplateStoreUpdated => None,
        }
    }

    /// The static rule for this change type.
    pub fn rule(self) -> &'static InvalidationRule {
        rule(self)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change type string that names no known mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown change type `{0}`")]
pub struct UnknownChangeType(pub String);

impl FromStr for ChangeType {
    type Err = UnknownChangeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChangeType::ALL
            .into_iter()
            .find(|change| change.as_str() == s)
            .ok_or_else(|| UnknownChangeType(s.to_string()))
    }
}

/// Cache family a rule refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternTag {
    /// Single product records.
    Product,
    /// Paginated product lists.
    Products,
    FeaturedProducts,
    SearchProducts,
    /// One collection and its variants.
    Collection,
    Collections,
    /// One content page record.
    Page,
    /// The content page list.
    Pages,
    /// Navigation and menus; rendered pages embed them.
    Navigation,
    Template,
    CompiledTemplate,
    /// Domain resolution entries, keyed by host name.
    Domain,
}

/// Families to purge for one change type.
#[derive(Debug, PartialEq, Eq)]
pub struct InvalidationRule {
    pub patterns: &'static [PatternTag],
    pub description: &'static str,
}

use PatternTag::*;

static PRODUCT_CREATED: InvalidationRule = InvalidationRule {
    patterns: &[Products, FeaturedProducts, SearchProducts, Collection],
    description: "Product created: invalidate lists and searches",
};

static PRODUCT_CHANGED: InvalidationRule = InvalidationRule {
    patterns: &[Product, Products, FeaturedProducts, SearchProducts, Collection],
    description: "Product changed: invalidate product and lists",
};

static COLLECTION_CREATED: InvalidationRule = InvalidationRule {
    patterns: &[Collections, Navigation],
    description: "Collection created: invalidate lists and navigation",
};

static COLLECTION_CHANGED: InvalidationRule = InvalidationRule {
    patterns: &[Collection, Collections, Navigation],
    description: "Collection changed: invalidate collection and lists",
};

static PAGE_CREATED: InvalidationRule = InvalidationRule {
    patterns: &[Pages, Navigation],
    description: "Page created: invalidate lists and navigation",
};

static PAGE_CHANGED: InvalidationRule = InvalidationRule {
    patterns: &[Page, Pages, Navigation],
    description: "Page changed: invalidate page and lists",
};

static NAVIGATION_UPDATED: InvalidationRule = InvalidationRule {
    patterns: &[Navigation],
    description: "Navigation updated: invalidate menus",
};

static TEMPLATE_UPDATED: InvalidationRule = InvalidationRule {
    patterns: &[Template, CompiledTemplate],
    description: "Template updated: invalidate templates",
};

static STORE_SETTINGS_UPDATED: InvalidationRule = InvalidationRule {
    patterns: &[Domain, Navigation],
    description: "Store settings updated: invalidate domains and navigation",
};

static DOMAIN_UPDATED: InvalidationRule = InvalidationRule {
    patterns: &[Domain],
    description: "Domain updated: invalidate domain resolution",
};

static TEMPLATE_STORE_UPDATED: InvalidationRule = InvalidationRule {
    patterns: &[Template, CompiledTemplate],
    description: "Store template file updated: invalidate raw and compiled templates",
};

/// The rule for a change type. Every change type has exactly one.
pub fn rule(change: ChangeType) -> &'static InvalidationRule {
    match change {
        ChangeType::ProductCreated => &PRODUCT_CREATED,
        ChangeType::ProductUpdated | ChangeType::ProductDeleted => &PRODUCT_CHANGED,
        ChangeType::CollectionCreated => &COLLECTION_CREATED,
        ChangeType::CollectionUpdated | ChangeType::CollectionDeleted => &COLLECTION_CHANGED,
        ChangeType::PageCreated => &PAGE_CREATED,
        ChangeType::PageUpdated | ChangeType::PageDeleted => &PAGE_CHANGED,
        ChangeType::NavigationUpdated => &NAVIGATION_UPDATED,
        ChangeType::TemplateUpdated => &TEMPLATE_UPDATED,
        ChangeType::StoreSettingsUpdated => &STORE_SETTINGS_UPDATED,
        ChangeType::DomainUpdated => &DOMAIN_UPDATED,
        ChangeType::TemplateStoreUpdated => &TEMPLATE_STORE_UPDATED,
    }
}
