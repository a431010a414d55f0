//! Entity schemas for the catalog collections.
//!
//! Each persisted entity type is described by a static [`EntitySchema`]:
//! its collection, identifier field and prefix, business key, optional asset
//! field, activation behaviour and the client-writable fields. The generic
//! resource manager is instantiated once per schema.

use serde_json::{Map, Value};

use crate::error::{CoreError, Result};

pub const ACTIVE_FIELD: &str = "active";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// How a client-writable field is coerced and validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text. Numbers and booleans are accepted and stored as text.
    Text,
    /// `true`/`false`, either as JSON booleans or form strings.
    Boolean,
    /// Array of objects whose listed keys are required strings. Form clients
    /// submit it as an embedded JSON string.
    ObjectList(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text,
            required: true,
        }
    }

    const fn optional_text(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text,
            required: false,
        }
    }

    const fn active() -> Self {
        Self {
            name: ACTIVE_FIELD,
            kind: FieldKind::Boolean,
            required: false,
        }
    }
}

/// Activation behaviour of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// No `active` flag.
    None,
    /// Independent `active` flag, defaulting to `true`.
    Toggle,
    /// At most one record of the type may be active at a time.
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySchema {
    /// Display name used in messages ("Category", "Popup").
    pub entity: &'static str,
    pub collection: &'static str,
    pub id_field: &'static str,
    pub id_prefix: &'static str,
    /// Business key shown to users.
    pub name_field: &'static str,
    /// Whether the business key carries a unique index.
    pub unique_name: bool,
    /// Cache tag shared by every list view of this type.
    pub list_tag: &'static str,
    pub asset_field: Option<&'static str>,
    pub activation: Activation,
    pub fields: &'static [FieldSpec],
    /// Whether list views are paged (`page`/`limit`) rather than returned whole.
    pub paged: bool,
    /// Fields matched by free-text search; empty when the type is not searchable.
    pub search_fields: &'static [&'static str],
}

pub const CATEGORY: EntitySchema = EntitySchema {
    entity: "Category",
    collection: "categories",
    id_field: "categoryId",
    id_prefix: "categoryId",
    name_field: "categoryName",
    unique_name: true,
    list_tag: "allCategories",
    asset_field: None,
    activation: Activation::None,
    fields: &[FieldSpec::text("categoryName")],
    paged: false,
    search_fields: &[],
};

pub const MOLECULE: EntitySchema = EntitySchema {
    entity: "Molecule",
    collection: "molecules",
    id_field: "moleculeId",
    id_prefix: "moleculeId",
    name_field: "moleculeName",
    unique_name: true,
    list_tag: "allMolecules",
    asset_field: None,
    activation: Activation::None,
    fields: &[FieldSpec::text("moleculeName")],
    paged: false,
    search_fields: &[],
};

pub const STRENGTH: EntitySchema = EntitySchema {
    entity: "Strength",
    collection: "strengths",
    id_field: "strengthId",
    id_prefix: "strengthId",
    name_field: "strengthName",
    unique_name: true,
    list_tag: "allStrengths",
    asset_field: None,
    activation: Activation::None,
    fields: &[FieldSpec::text("strengthName")],
    paged: false,
    search_fields: &[],
};

pub const PACKAGING_SIZE: EntitySchema = EntitySchema {
    entity: "Packaging size",
    collection: "packagingsizes",
    id_field: "packagingsizeId",
    id_prefix: "packagingsizeId",
    name_field: "packagingsizeName",
    unique_name: true,
    list_tag: "allPackagingSizes",
    asset_field: None,
    activation: Activation::None,
    fields: &[FieldSpec::text("packagingsizeName")],
    paged: false,
    search_fields: &[],
};

pub const SLIDER: EntitySchema = EntitySchema {
    entity: "Slider",
    collection: "sliders",
    id_field: "sliderId",
    id_prefix: "sliderId",
    name_field: "sliderName",
    unique_name: false,
    list_tag: "allSliders",
    asset_field: Some("sliderImage"),
    activation: Activation::Toggle,
    fields: &[FieldSpec::text("sliderName"), FieldSpec::active()],
    paged: false,
    search_fields: &[],
};

pub const POPUP: EntitySchema = EntitySchema {
    entity: "Popup",
    collection: "popups",
    id_field: "popupId",
    id_prefix: "popupId",
    name_field: "popupName",
    unique_name: false,
    list_tag: "allPopups",
    asset_field: Some("popupImage"),
    activation: Activation::Exclusive,
    fields: &[FieldSpec::text("popupName"), FieldSpec::active()],
    paged: false,
    search_fields: &[],
};

pub const MOLECULE_LIST_FIELD: &str = "moleculeAndStrengthName";
pub const MOLECULE_NAME_FIELD: &str = "moleculeName";
/// Product field matched by the `category` list filter.
pub const PRODUCT_CATEGORY_FIELD: &str = "categoryName";

pub const PRODUCT: EntitySchema = EntitySchema {
    entity: "Product",
    collection: "products",
    id_field: "productId",
    id_prefix: "productId",
    name_field: "brandName",
    unique_name: false,
    list_tag: "allProducts",
    asset_field: Some("productImage"),
    activation: Activation::Toggle,
    fields: &[
        FieldSpec::text("brandName"),
        FieldSpec::text(PRODUCT_CATEGORY_FIELD),
        FieldSpec {
            name: MOLECULE_LIST_FIELD,
            kind: FieldKind::ObjectList(&[MOLECULE_NAME_FIELD, "strengthName"]),
            required: false,
        },
        FieldSpec::text("productPrice"),
        FieldSpec::text("packagingsizeName"),
        FieldSpec::optional_text("productptr"),
        FieldSpec::optional_text("productpts"),
        FieldSpec::active(),
    ],
    paged: true,
    search_fields: &["brandName", "moleculeAndStrengthName.moleculeName"],
};

/// Every catalog entity type.
pub const ALL: [&EntitySchema; 7] = [
    &CATEGORY,
    &MOLECULE,
    &STRENGTH,
    &PACKAGING_SIZE,
    &SLIDER,
    &POPUP,
    &PRODUCT,
];

impl EntitySchema {
    pub fn has_active_flag(&self) -> bool {
        self.activation != Activation::None
    }

    pub fn is_searchable(&self) -> bool {
        !self.search_fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Builds the client-supplied part of a new record.
    ///
    /// Unknown keys are dropped, required fields must be present and
    /// non-empty, and `active` defaults to `true` for activatable types.
    pub fn prepare_create(&self, input: &Map<String, Value>) -> Result<Map<String, Value>> {
        let mut doc = Map::new();
        for spec in self.fields {
            let value = input
                .get(spec.name)
                .map(|v| coerce(spec, v))
                .transpose()?
                .flatten();
            match value {
                Some(value) => {
                    doc.insert(spec.name.to_string(), value);
                }
                None if spec.required => {
                    return Err(CoreError::validation(format!("{} is required", spec.name)));
                }
                None => {}
            }
        }
        if has_molecule_list(self) && !doc.contains_key(MOLECULE_LIST_FIELD) {
            doc.insert(MOLECULE_LIST_FIELD.to_string(), Value::Array(Vec::new()));
        }
        if self.has_active_flag() && !doc.contains_key(ACTIVE_FIELD) {
            doc.insert(ACTIVE_FIELD.to_string(), Value::Bool(true));
        }
        Ok(doc)
    }

    /// Builds a partial update from client input.
    ///
    /// Only known fields are kept; empty text leaves the stored value alone.
    pub fn prepare_update(&self, input: &Map<String, Value>) -> Result<Map<String, Value>> {
        let mut patch = Map::new();
        for spec in self.fields {
            let value = input
                .get(spec.name)
                .map(|v| coerce(spec, v))
                .transpose()?
                .flatten();
            if let Some(value) = value {
                patch.insert(spec.name.to_string(), value);
            }
        }
        Ok(patch)
    }
}

fn has_molecule_list(schema: &EntitySchema) -> bool {
    schema.field(MOLECULE_LIST_FIELD).is_some()
}

/// Coerces one input value; `Ok(None)` means "treat as absent".
fn coerce(spec: &FieldSpec, value: &Value) -> Result<Option<Value>> {
    match spec.kind {
        FieldKind::Text => coerce_text(spec.name, value),
        FieldKind::Boolean => coerce_bool(spec.name, value),
        FieldKind::ObjectList(keys) => coerce_object_list(spec.name, keys, value),
    }
}

fn coerce_text(name: &str, value: &Value) -> Result<Option<Value>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(_) => Ok(Some(value.clone())),
        Value::Number(n) => Ok(Some(Value::String(n.to_string()))),
        Value::Bool(b) => Ok(Some(Value::String(b.to_string()))),
        Value::Array(_) | Value::Object(_) => Err(CoreError::validation(format!(
            "{name} must be a text value"
        ))),
    }
}

fn coerce_bool(name: &str, value: &Value) -> Result<Option<Value>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(_) => Ok(Some(value.clone())),
        Value::String(s) => match s.trim() {
            "" => Ok(None),
            "true" => Ok(Some(Value::Bool(true))),
            "false" => Ok(Some(Value::Bool(false))),
            _ => Err(CoreError::validation(format!(
                "{name} must be a boolean value"
            ))),
        },
        _ => Err(CoreError::validation(format!(
            "{name} must be a boolean value"
        ))),
    }
}

fn coerce_object_list(name: &str, keys: &[&str], value: &Value) -> Result<Option<Value>> {
    let parsed;
    let items = match value {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => {
            parsed = serde_json::from_str::<Value>(s)
                .map_err(|e| CoreError::validation(format!("Invalid JSON format for {name}: {e}")))?;
            &parsed
        }
        other => other,
    };

    let Value::Array(items) = items else {
        return Err(CoreError::validation(format!("{name} must be an array")));
    };

    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let Value::Object(obj) = item else {
            return Err(CoreError::validation(format!(
                "{name}[{index}] must be an object"
            )));
        };
        let mut entry = Map::new();
        for key in keys {
            match obj.get(*key) {
                Some(Value::String(s)) if !s.trim().is_empty() => {
                    entry.insert((*key).to_string(), Value::String(s.clone()));
                }
                _ => {
                    return Err(CoreError::validation(format!(
                        "{name}[{index}].{key} is required"
                    )));
                }
            }
        }
        out.push(Value::Object(entry));
    }
    Ok(Some(Value::Array(out)))
}
