//! Product search helpers: fuzzy patterns and suggestion rows.

use catalog_core::schema::{MOLECULE_LIST_FIELD, MOLECULE_NAME_FIELD};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of a search or suggestion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionItem {
    pub product_id: String,
    pub brand_name: String,
    pub product_image: Option<Value>,
    pub molecule_name: Option<String>,
}

/// Builds the fuzzy pattern: every character escaped, joined by `.*`.
///
/// `"amx"` becomes `a.*m.*x`, so it matches "Amoxyclav" and "Amoxicillin"
/// once applied case-insensitively.
pub fn fuzzy_pattern(query: &str) -> String {
    query
        .chars()
        .map(|c| regex::escape(c.encode_utf8(&mut [0u8; 4])))
        .collect::<Vec<_>>()
        .join(".*")
}

/// Flattens product documents into suggestion rows.
///
/// Each product appears once, in input order, carrying the first molecule
/// name that matches `matcher` (or its first molecule when nothing matches
/// or no matcher is given). At most `cap` rows are returned.
pub fn flatten_suggestions(
    products: &[Value],
    id_field: &str,
    name_field: &str,
    asset_field: Option<&str>,
    matcher: Option<&Regex>,
    cap: usize,
) -> Vec<SuggestionItem> {
    let mut seen = std::collections::HashSet::new();
    let mut rows = Vec::new();

    for product in products {
        if rows.len() >= cap {
            break;
        }
        let Some(product_id) = product.get(id_field).and_then(Value::as_str) else {
            continue;
        };
        if !seen.insert(product_id.to_string()) {
            continue;
        }

        let molecules: Vec<&str> = product
            .get(MOLECULE_LIST_FIELD)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| m.get(MOLECULE_NAME_FIELD).and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        let molecule_name = matcher
            .and_then(|re| molecules.iter().find(|name| re.is_match(name)))
            .or_else(|| molecules.first())
            .map(|name| name.to_string());

        rows.push(SuggestionItem {
            product_id: product_id.to_string(),
            brand_name: product
                .get(name_field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            product_image: asset_field.and_then(|f| product.get(f)).cloned(),
            molecule_name,
        });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::RegexBuilder;
    use serde_json::json;

    fn matcher(query: &str) -> Regex {
        RegexBuilder::new(&fuzzy_pattern(query))
            .case_insensitive(true)
            .build()
            .unwrap()
    }

    fn product(id: &str, brand: &str, molecules: &[&str]) -> Value {
        json!({
            "productId": id,
            "brandName": brand,
            "productImage": {"secure_url": format!("https://img/{id}"), "public_id": id},
            "moleculeAndStrengthName": molecules
                .iter()
                .map(|m| json!({"moleculeName": m, "strengthName": "500mg"}))
                .collect::<Vec<_>>()
        })
    }

    #[test]
    fn fuzzy_pattern_interleaves_wildcards() {
        assert_eq!(fuzzy_pattern("amx"), "a.*m.*x");
        let re = matcher("amx");
        assert!(re.is_match("Amoxyclav"));
        assert!(re.is_match("Amoxicillin"));
        assert!(!re.is_match("Paracetamol"));
    }

    #[test]
    fn fuzzy_pattern_escapes_metacharacters() {
        assert_eq!(fuzzy_pattern("a+"), "a.*\\+");
        let re = matcher("(x");
        assert!(re.is_match("a(bx"));
        assert!(!re.is_match("abx"));
    }

    #[test]
    fn flatten_keeps_first_matching_molecule() {
        let products = vec![
            product("productId0001", "Augmentin", &["Clavulanic Acid", "Amoxicillin"]),
            product("productId0002", "Amoxyclav", &["Potassium Clavulanate"]),
            product("productId0001", "Augmentin", &["Amoxicillin"]),
        ];
        let re = matcher("amx");
        let rows = flatten_suggestions(
            &products,
            "productId",
            "brandName",
            Some("productImage"),
            Some(&re),
            30,
        );

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].molecule_name.as_deref(), Some("Amoxicillin"));
        // Brand matched, no molecule did: fall back to the first molecule.
        assert_eq!(rows[1].brand_name, "Amoxyclav");
        assert_eq!(rows[1].molecule_name.as_deref(), Some("Potassium Clavulanate"));
        assert_eq!(rows[1].product_image.as_ref().unwrap()["public_id"], "productId0002");
    }

    #[test]
    fn flatten_respects_cap() {
        let products: Vec<Value> = (1..=40)
            .map(|i| product(&format!("productId{i:04}"), "Brand", &["Amoxicillin"]))
            .collect();
        let rows = flatten_suggestions(&products, "productId", "brandName", None, None, 30);
        assert_eq!(rows.len(), 30);
        assert!(rows.iter().all(|r| r.product_image.is_none()));
    }

    #[test]
    fn suggestion_serializes_camel_case() {
        let row = SuggestionItem {
            product_id: "productId0001".into(),
            brand_name: "Amoxyclav".into(),
            product_image: None,
            molecule_name: Some("Amoxicillin".into()),
        };
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!({
                "productId": "productId0001",
                "brandName": "Amoxyclav",
                "productImage": null,
                "moleculeName": "Amoxicillin"
            })
        );
    }
}
