//! Invalidation plan generation.
//!
//! Turns one change event into the ordered, de-duplicated list of cache
//! deletions it requires. Each stage is a pure function of the request:
//!
//! 1. path cascade: `layout/` and `sections/` wipe every rendered page
//! 2. rule patterns of the change type
//! 3. entity-specific keys, when an entity id is given
//! 4. path heuristics for `templates/` and `snippets/`, skipped after a cascade
//!
//! Ambiguous cases always widen the purge.

use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::keys;
use super::rules::{ChangeType, PatternTag};

static TEMPLATE_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"templates/([^/.]+)\.(?:json|liquid)").expect("template type pattern is valid")
});

/// One cache deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum Purge {
    /// Delete exactly this key.
    Key(String),
    /// Delete every key starting with this literal prefix.
    Prefix(String),
}

impl fmt::Display for Purge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Purge::Key(key) => write!(f, "key {key}"),
            Purge::Prefix(prefix) => write!(f, "prefix {prefix}"),
        }
    }
}

/// A change event as seen by the planner.
#[derive(Debug, Clone, Copy)]
pub struct InvalidationRequest<'a> {
    pub change: ChangeType,
    pub store_id: &'a str,
    pub entity_id: Option<&'a str>,
    pub path: Option<&'a str>,
}

impl<'a> InvalidationRequest<'a> {
    pub fn new(change: ChangeType, store_id: &'a str) -> Self {
        Self {
            change,
            store_id,
            entity_id: None,
            path: None,
        }
    }

    pub fn with_entity(mut self, entity_id: Option<&'a str>) -> Self {
        self.entity_id = entity_id.filter(|id| !id.is_empty());
        self
    }

    pub fn with_path(mut self, path: Option<&'a str>) -> Self {
        self.path = path.filter(|path| !path.is_empty());
        self
    }
}

/// Deletions to apply for one change event, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationPlan {
    /// Whether the layout/sections cascade fired.
    pub page_cascade: bool,
    pub purges: Vec<Purge>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ cascade: {}, purges: {} }}",
            self.page_cascade,
            self.purges.len()
        )?;
        for purge in &self.purges {
            write!(f, "\n  {purge}")?;
        }
        Ok(())
    }
}

impl InvalidationPlan {
    /// Build the plan for a request.
    pub fn for_request(request: &InvalidationRequest<'_>) -> Self {
        let cascade = path_cascade(request.store_id, request.path);
        let page_cascade = !cascade.is_empty();

        let mut staged = cascade;
        staged.extend(pattern_purges(
            request.change,
            request.store_id,
            request.entity_id,
        ));
        if let Some(entity_id) = request.entity_id {
            staged.extend(entity_purges(request.change, request.store_id, entity_id));
        }
        if !page_cascade {
            staged.extend(path_purges(request.store_id, request.path));
        }

        let mut seen = HashSet::new();
        let purges = staged
            .into_iter()
            .filter(|purge| seen.insert(purge.clone()))
            .collect();

        Self {
            page_cascade,
            purges,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.purges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.purges.len()
    }
}

fn all_pages(store_id: &str) -> Purge {
    Purge::Prefix(keys::rendered_pages_prefix(store_id))
}

/// Stage 1: files shared by every page.
pub fn path_cascade(store_id: &str, path: Option<&str>) -> Vec<Purge> {
    match path {
        Some(path) if path.contains("layout/") || path.contains("sections/") => {
            vec![all_pages(store_id)]
        }
        _ => Vec::new(),
    }
}

/// Stage 2: the families named by the change type's rule, in rule order.
///
/// The entity id only narrows the family it identifies; every other family
/// is purged store-wide.
pub fn pattern_purges(change: ChangeType, store_id: &str, entity_id: Option<&str>) -> Vec<Purge> {
    let subject = change.subject();
    change
        .rule()
        .patterns
        .iter()
        .flat_map(|tag| {
            let scoped = entity_id.filter(|_| subject == Some(*tag));
            pattern_purge(*tag, store_id, scoped)
        })
        .collect()
}

/// Deletions for one family tag. `entity_id` must identify a member of that
/// family.
pub fn pattern_purge(tag: PatternTag, store_id: &str, entity_id: Option<&str>) -> Vec<Purge> {
    match tag {
        PatternTag::Product => match entity_id {
            Some(id) => vec![Purge::Key(keys::product_key(store_id, id))],
            None => vec![Purge::Prefix(keys::product_store_prefix(store_id))],
        },
        PatternTag::Products => vec![Purge::Prefix(keys::products_prefix(store_id))],
        PatternTag::FeaturedProducts => {
            vec![Purge::Prefix(keys::featured_products_prefix(store_id))]
        }
        PatternTag::SearchProducts => vec![Purge::Prefix(keys::search_products_prefix(store_id))],
        PatternTag::Collection => match entity_id {
            Some(id) => vec![
                Purge::Key(keys::collection_key(store_id, id)),
                Purge::Prefix(keys::collection_prefix(store_id, id)),
            ],
            None => vec![Purge::Prefix(keys::collection_store_prefix(store_id))],
        },
        PatternTag::Collections => vec![Purge::Prefix(keys::collections_prefix(store_id))],
        PatternTag::Page => match entity_id {
            Some(id) => vec![Purge::Key(keys::page_key(store_id, id))],
            None => vec![all_pages(store_id)],
        },
        PatternTag::Pages => vec![Purge::Key(keys::pages_key(store_id))],
        PatternTag::Navigation => vec![
            Purge::Prefix(keys::navigation_prefix(store_id)),
            Purge::Prefix(keys::navigation_menu_prefix(store_id)),
            all_pages(store_id),
        ],
        PatternTag::Template => vec![
            Purge::Prefix(keys::template_prefix(store_id)),
            all_pages(store_id),
        ],
        PatternTag::CompiledTemplate => vec![
            Purge::Prefix(keys::compiled_template_prefix(store_id)),
            all_pages(store_id),
        ],
        // Keyed by host name; the entity id carries the domain.
        PatternTag::Domain => entity_id
            .map(|domain| vec![Purge::Key(keys::domain_key(domain))])
            .unwrap_or_default(),
    }
}

/// Stage 3: exact entries of the mutated entity and the listings embedding it.
pub fn entity_purges(change: ChangeType, store_id: &str, entity_id: &str) -> Vec<Purge> {
    match change {
        ChangeType::ProductUpdated | ChangeType::ProductDeleted => vec![
            Purge::Key(keys::product_key(store_id, entity_id)),
            Purge::Prefix(keys::products_prefix(store_id)),
            Purge::Prefix(keys::featured_products_prefix(store_id)),
            Purge::Prefix(keys::typed_pages_prefix(store_id, "product")),
            Purge::Key(keys::product_handle_map_key(store_id)),
        ],
        ChangeType::CollectionUpdated | ChangeType::CollectionDeleted => vec![
            Purge::Key(keys::collection_key(store_id, entity_id)),
            Purge::Prefix(keys::collection_prefix(store_id, entity_id)),
            Purge::Prefix(keys::collections_prefix(store_id)),
            Purge::Prefix(keys::typed_pages_prefix(store_id, "collection")),
        ],
        ChangeType::PageUpdated | ChangeType::PageDeleted => vec![
            Purge::Key(keys::page_key(store_id, entity_id)),
            Purge::Key(keys::pages_key(store_id)),
        ],
        _ => Vec::new(),
    }
}

/// Stage 4: template and snippet heuristics.
pub fn path_purges(store_id: &str, path: Option<&str>) -> Vec<Purge> {
    let Some(path) = path else {
        return Vec::new();
    };

    if path.contains("templates/") {
        return match template_type(path) {
            Some(page_type) => vec![Purge::Prefix(keys::typed_pages_prefix(store_id, page_type))],
            None => vec![all_pages(store_id)],
        };
    }

    // No inclusion graph for snippets.
    if path.contains("snippets/") {
        return vec![all_pages(store_id)];
    }

    Vec::new()
}

/// Page type of a top-level template (`templates/product.json` → `product`).
pub fn template_type(path: &str) -> Option<&str> {
    TEMPLATE_TYPE
        .captures(path)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}
