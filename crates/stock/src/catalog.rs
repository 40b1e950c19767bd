//! Reference data products point at: categories and units of measure.

use chrono::{DateTime, Utc};

use stockroom_core::{CategoryId, DomainError, DomainResult, UnitId};

/// Product category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: &str, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id: CategoryId::new(),
            name: normalize_name("category", name)?,
            created_at: now,
        })
    }

    pub fn renamed(&self, name: &str) -> DomainResult<Self> {
        Ok(Self {
            name: normalize_name("category", name)?,
            ..self.clone()
        })
    }
}

/// Unit of measure (piece, box, kg, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Unit {
    pub fn new(name: &str, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id: UnitId::new(),
            name: normalize_name("unit", name)?,
            created_at: now,
        })
    }

    pub fn renamed(&self, name: &str) -> DomainResult<Self> {
        Ok(Self {
            name: normalize_name("unit", name)?,
            ..self.clone()
        })
    }
}

/// Trim a display name and reject empty ones.
pub(crate) fn normalize_name(what: &str, name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::invalid_argument(format!(
            "{what} name cannot be empty"
        )));
    }
    Ok(name.to_string())
}

/// Trimmed free text; blank collapses to `None`.
pub(crate) fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_required() {
        let cat = Category::new("  Drinks ", Utc::now()).unwrap();
        assert_eq!(cat.name, "Drinks");
        assert!(matches!(
            Unit::new("   ", Utc::now()),
            Err(DomainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn blank_descriptions_collapse() {
        assert_eq!(normalize_description(Some("  fresh ".into())), Some("fresh".into()));
        assert_eq!(normalize_description(Some("   ".into())), None);
        assert_eq!(normalize_description(None), None);
    }

    #[test]
    fn rename_keeps_identity() {
        let unit = Unit::new("box", Utc::now()).unwrap();
        let renamed = unit.renamed("carton").unwrap();
        assert_eq!(renamed.id, unit.id);
        assert_eq!(renamed.name, "carton");
    }
}
