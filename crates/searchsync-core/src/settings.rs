//! Index settings payload and the per-entity defaults applied on setup.

use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;

/// Settings object applied to an index. Applying the same object twice is a
/// no-op on the engine side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSettings {
    /// Attributes returned in hits; `["*"]` returns everything.
    pub displayed_attributes: Vec<String>,
    /// Ordered by relevance weight, most important first.
    pub searchable_attributes: Vec<String>,
    pub filterable_attributes: Vec<String>,
    pub sortable_attributes: Vec<String>,
    pub faceting: Faceting,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Faceting {
    pub max_values_per_facet: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub max_total_hits: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            displayed_attributes: vec!["*".into()],
            searchable_attributes: vec!["*".into()],
            filterable_attributes: vec![],
            sortable_attributes: vec!["id".into()],
            faceting: Faceting {
                max_values_per_facet: 100,
            },
            pagination: Pagination {
                max_total_hits: 1000,
            },
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl IndexSettings {
    /// Settings every deploy applies to the index of `entity`.
    ///
    /// `maxTotalHits` is raised well above the engine default so full-collection
    /// scans and deep result pages stay reachable.
    pub fn for_entity(entity: EntityKind) -> Self {
        let base = Self {
            pagination: Pagination {
                max_total_hits: 1_000_000,
            },
            ..Self::default()
        };
        match entity {
            EntityKind::Agency => Self {
                searchable_attributes: strings(&[
                    "acronym",
                    "name",
                    "name_versions",
                    "country",
                    "focus_countries",
                ]),
                filterable_attributes: strings(&[
                    "id",
                    "country",
                    "focus_countries",
                    "activities",
                    "is_registered",
                ]),
                sortable_attributes: strings(&["id", "name_sort", "registration_start"]),
                ..base
            },
            EntityKind::Institution => Self {
                searchable_attributes: strings(&[
                    "name_primary",
                    "names",
                    "acronym",
                    "city",
                    "country",
                    "identifiers",
                    "website_link",
                ]),
                filterable_attributes: strings(&[
                    "id",
                    "country",
                    "city",
                    "qf_ehea_levels",
                    "agencies",
                    "activity_types",
                    "status",
                    "has_report",
                    "founding_date",
                    "closure_date",
                ]),
                sortable_attributes: strings(&["id", "name_sort", "founding_date"]),
                faceting: Faceting {
                    max_values_per_facet: 500,
                },
                ..base
            },
            EntityKind::Report => Self {
                searchable_attributes: strings(&[
                    "institutions",
                    "programmes",
                    "agency",
                    "activities",
                    "files",
                ]),
                filterable_attributes: strings(&[
                    "id",
                    "agency",
                    "country",
                    "activities",
                    "activity_types",
                    "decision",
                    "status",
                    "flag",
                    "language",
                    "valid_from",
                    "valid_to",
                    "year",
                ]),
                sortable_attributes: strings(&["id", "valid_from", "valid_to", "created_at"]),
                faceting: Faceting {
                    max_values_per_facet: 500,
                },
                ..base
            },
            EntityKind::Programme => Self {
                searchable_attributes: strings(&[
                    "name_primary",
                    "names",
                    "qualifications",
                    "institutions",
                    "country",
                ]),
                filterable_attributes: strings(&[
                    "id",
                    "country",
                    "qf_ehea_level",
                    "institutions",
                    "agencies",
                    "degree_outcome",
                ]),
                sortable_attributes: strings(&["id", "name_sort"]),
                ..base
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialises_engine_field_names() {
        let v = serde_json::to_value(IndexSettings::default()).unwrap();
        assert_eq!(v["displayedAttributes"], json!(["*"]));
        assert_eq!(v["faceting"]["maxValuesPerFacet"], json!(100));
        assert_eq!(v["pagination"]["maxTotalHits"], json!(1000));
    }

    #[test]
    fn every_entity_can_sort_and_filter_by_id() {
        for entity in EntityKind::ALL {
            let s = IndexSettings::for_entity(entity);
            assert!(s.sortable_attributes.iter().any(|a| a == "id"), "{entity}");
            assert!(s.filterable_attributes.iter().any(|a| a == "id"), "{entity}");
        }
    }
}
