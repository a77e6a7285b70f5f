//! Catalog taxonomy helpers: slugs, the category tree, payload shaping for
//! attributes and brands.

use ibulore_core::CategoryId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// ASCII replacement for a Latin letter with diacritics, if it has one.
const fn fold_char(c: char) -> Option<char> {
    Some(match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ç' => 'c',
        'Ç' => 'C',
        'ý' | 'ÿ' => 'y',
        'Ý' => 'Y',
        _ => return None,
    })
}

/// URL slug for a taxonomy name.
///
/// Accented Latin letters fold to ASCII, other non-ASCII characters are
/// dropped, whitespace runs become one `-`, and the result never starts or
/// ends with `-`.
#[must_use]
pub fn slugify(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter_map(|c| if c.is_ascii() { Some(c) } else { fold_char(c) })
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_whitespace() || *c == '-')
        .collect();

    let mut slug = String::with_capacity(kept.len());
    for c in kept.trim().chars() {
        let c = if c.is_ascii_whitespace() { '-' } else { c };
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    slug.trim_matches('-').to_string()
}

/// Fill `slug` from `name` when it is absent or blank.
pub fn ensure_slug(body: &mut Map<String, Value>) {
    let blank = body
        .get("slug")
        .and_then(Value::as_str)
        .is_none_or(|s| s.trim().is_empty());
    if !blank {
        return;
    }
    if let Some(name) = body.get("name").and_then(Value::as_str) {
        let slug = slugify(name);
        tracing::debug!(%slug, %name, "Generated slug");
        body.insert("slug".to_string(), Value::String(slug));
    }
}

/// A product category as listed by the commerce source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    #[serde(default)]
    pub parent: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A category with its depth and subcategories.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub level: usize,
    pub children: Vec<CategoryNode>,
}

fn subtree(categories: &[Category], parent: u64, level: usize) -> Vec<CategoryNode> {
    categories
        .iter()
        .filter(|c| c.parent == parent && c.id.as_u64() != parent)
        .map(|c| CategoryNode {
            category: c.clone(),
            level,
            children: subtree(categories, c.id.as_u64(), level + 1),
        })
        .collect()
}

/// Nest categories under their parents, roots at level 0. Input order is
/// kept among siblings; categories whose parent is not listed are dropped.
#[must_use]
pub fn hierarchy(categories: &[Category]) -> Vec<CategoryNode> {
    subtree(categories, 0, 0)
}

/// Why a category cannot be deleted, if anything blocks it.
#[must_use]
pub fn deletion_blocker(subcategories: usize, products: u64) -> Option<String> {
    if subcategories > 0 {
        return Some(format!(
            "No se puede eliminar la categoría porque tiene {subcategories} subcategorías. Elimina o reasigna las subcategorías primero."
        ));
    }
    if products > 0 {
        return Some(format!(
            "No se puede eliminar la categoría porque contiene {products} productos. Reasigna los productos a otra categoría primero."
        ));
    }
    None
}

/// Build the record to return when a write succeeded with an empty body.
#[must_use]
pub fn echo_record(id: Option<u64>, body: &Map<String, Value>, defaults: Value) -> Value {
    let mut record = Map::new();
    record.insert("id".to_string(), id.map_or(Value::Null, Value::from));
    record.insert(
        "name".to_string(),
        body.get("name").cloned().unwrap_or(Value::Null),
    );
    if let Value::Object(defaults) = defaults {
        for (key, default) in defaults {
            let value = body.get(&key).cloned().unwrap_or(default);
            record.insert(key, value);
        }
    }
    Value::Object(record)
}

/// Defaults echoed for a created category.
#[must_use]
pub fn category_defaults() -> Value {
    json!({
        "slug": "",
        "description": "",
        "parent": 0,
        "count": 0,
        "display": "default",
        "menu_order": 0,
    })
}

/// Defaults echoed for an attribute write.
#[must_use]
pub fn attribute_defaults() -> Value {
    json!({
        "slug": "",
        "type": "select",
        "order_by": "menu_order",
        "has_archives": false,
    })
}

/// Defaults echoed for an attribute term write.
#[must_use]
pub fn term_defaults() -> Value {
    json!({
        "slug": "",
        "description": "",
        "menu_order": 0,
        "count": 0,
    })
}

/// Attribute creation defaults, applied only to absent keys.
pub fn apply_attribute_defaults(body: &mut Map<String, Value>) {
    ensure_slug(body);
    for (key, value) in [
        ("type", json!("select")),
        ("order_by", json!("menu_order")),
        ("has_archives", json!(false)),
    ] {
        body.entry(key).or_insert(value);
    }
}

/// Whether a brand write creates or updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrandWrite {
    Create,
    Update,
}

/// Whitelist a brand payload to `name`, `slug`, `description`, `image.id`.
///
/// On update a present but empty image clears it with `{id: 0}`.
#[must_use]
pub fn brand_payload(body: &Map<String, Value>, write: BrandWrite) -> Map<String, Value> {
    let mut payload: Map<String, Value> = ["name", "slug", "description"]
        .iter()
        .filter_map(|key| {
            body.get(*key)
                .filter(|v| write == BrandWrite::Update || !v.is_null())
                .map(|v| ((*key).to_string(), v.clone()))
        })
        .collect();

    let image_id = body
        .get("image")
        .and_then(|image| image.get("id"))
        .filter(|id| !id.is_null())
        .cloned();
    match (image_id, write, body.contains_key("image")) {
        (Some(id), _, _) => {
            payload.insert("image".to_string(), json!({"id": id}));
        }
        (None, BrandWrite::Update, true) => {
            payload.insert("image".to_string(), json!({"id": 0}));
        }
        _ => {}
    }
    payload
}
