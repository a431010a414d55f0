//! Cache keys for list views.

use catalog_core::EntitySchema;

/// Tag shared by every paged product list key.
pub const PAGE_TAG: &str = "page:";

/// Normalized list request. Construct it after defaults have been applied so
/// that an absent parameter and its explicit default map to one key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    pub active: Option<bool>,
    pub category: Option<String>,
    pub search: Option<String>,
}

/// Key of a paged list: `page:{p}-limit:{l}[-active:{b}][-category:{c}][-search:{s}]`.
///
/// Free-text values are percent-encoded so they cannot forge a separator.
pub fn paged_key(query: &ListQuery) -> String {
    let mut key = format!("{PAGE_TAG}{}-limit:{}", query.page, query.limit);
    if let Some(active) = query.active {
        key.push_str(&format!("-active:{active}"));
    }
    if let Some(category) = &query.category {
        key.push_str(&format!("-category:{}", urlencoding::encode(category)));
    }
    if let Some(search) = &query.search {
        key.push_str(&format!("-search:{}", urlencoding::encode(search)));
    }
    key
}

/// Key of a full list: `all<Plural>` or `all<Plural>?active={b}`.
///
/// The active filter only participates for types that carry the flag.
pub fn full_list_key(schema: &EntitySchema, active: Option<bool>) -> String {
    match active.filter(|_| schema.has_active_flag()) {
        Some(active) => format!("{}?active={active}", schema.list_tag),
        None => schema.list_tag.to_string(),
    }
}

/// Tags swept after any write to the entity type.
pub fn write_tags(schema: &EntitySchema) -> [&'static str; 2] {
    [schema.list_tag, PAGE_TAG]
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::schema::{CATEGORY, POPUP, PRODUCT, SLIDER};

    fn products(page: u32, limit: u32) -> ListQuery {
        ListQuery {
            page,
            limit,
            ..Default::default()
        }
    }

    #[test]
    fn paged_key_shape() {
        assert_eq!(paged_key(&products(1, 20)), "page:1-limit:20");

        let query = ListQuery {
            active: Some(true),
            category: Some("Pain Relief".into()),
            search: Some("a-b&c".into()),
            ..products(2, 20)
        };
        assert_eq!(
            paged_key(&query),
            "page:2-limit:20-active:true-category:Pain%20Relief-search:a-b%26c"
        );
    }

    #[test]
    fn paged_keys_differ_per_filter() {
        let plain = paged_key(&products(1, 20));
        let active = paged_key(&ListQuery {
            active: Some(false),
            ..products(1, 20)
        });
        assert_ne!(plain, active);
        assert_ne!(paged_key(&products(1, 20)), paged_key(&products(1, 10)));
    }

    #[test]
    fn full_list_keys() {
        assert_eq!(full_list_key(&SLIDER, None), "allSliders");
        assert_eq!(full_list_key(&SLIDER, Some(true)), "allSliders?active=true");
        assert_eq!(full_list_key(&POPUP, Some(false)), "allPopups?active=false");
        // Categories have no active flag; the filter is ignored.
        assert_eq!(full_list_key(&CATEGORY, Some(true)), "allCategories");
    }

    #[test]
    fn write_tags_cover_both_views() {
        assert_eq!(write_tags(&PRODUCT), ["allProducts", "page:"]);
        let paged = paged_key(&products(3, 5));
        assert!(write_tags(&PRODUCT).iter().any(|t| paged.contains(t)));
        let full = full_list_key(&SLIDER, Some(true));
        assert!(write_tags(&SLIDER).iter().any(|t| full.contains(t)));
    }
}
