//! Query text generation
//!
//! Every statement takes the object id as `?1` and the LOD as `?2`.
//! Surface fetches with an appearance theme additionally bind the theme as
//! `?3`; callers check the statement's parameter count before binding it.

use super::QueryKey;
use crate::lod::surface_class_id::*;

/// What a statement is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPurpose {
    /// Count rows that would be fetched for the key's display form
    Existence,
    /// Count rows carrying explicit geometry or an implicit reference point
    Marker,
    /// Fetch the surface hierarchy
    Surfaces,
    /// Fetch every renderable polygon for a footprint union
    Aggregate,
}

pub trait QueryPlanner: Send + Sync {
    fn plan(&self, key: &QueryKey, purpose: QueryPurpose) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlQueryPlanner;

const SURFACE_COLUMNS: &str = "sg.id, sg.cityobject_id, sg.root_id, sg.parent_id, sg.gmlid, sg.is_xlink, \
     sg.thematic_class, sg.geometry, sg.ref_point, sg.transform";

const APPEARANCE_COLUMNS: &str = "sd.diffuse, sd.ambient, sd.specular, sd.emissive, sd.shininess, \
     sd.transparency, sd.tex_image_id, ti.uri, sd.tex_coords";

const NO_APPEARANCE_COLUMNS: &str = "NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL";

fn closure_classes() -> String {
    format!("{}, {}, {}", BUILDING_CLOSURE, BRIDGE_CLOSURE, TUNNEL_CLOSURE)
}

/// Rows that count as a stored footprint
fn footprint_filter() -> String {
    format!(
        "(sg.role = 'footprint' OR sg.thematic_class IN ({}, {}, {}))",
        BUILDING_GROUND, BRIDGE_GROUND, TUNNEL_GROUND
    )
}

impl SqlQueryPlanner {
    /// Restriction on top of object id and LOD for the key's class and
    /// display form. Classes that can aggregate a footprint only accept
    /// stored footprints directly; classes without implicit geometry never
    /// see template instances.
    fn form_filter(&self, key: &QueryKey) -> Option<String> {
        let capability = key.class.capability();
        let mut clauses = Vec::new();
        if key.form.is_footprint_based() && capability.aggregates_footprint {
            clauses.push(footprint_filter());
        }
        if !capability.supports_implicit {
            clauses.push("sg.role <> 'implicit'".to_string());
        }
        (!clauses.is_empty()).then(|| clauses.join(" AND "))
    }
}

impl QueryPlanner for SqlQueryPlanner {
    fn plan(&self, key: &QueryKey, purpose: QueryPurpose) -> String {
        let base = "FROM surface_geometry sg WHERE sg.cityobject_id = ?1 AND sg.lod = ?2";
        match purpose {
            QueryPurpose::Existence => {
                let mut sql = format!("SELECT COUNT(*) {} AND sg.geometry IS NOT NULL", base);
                if let Some(filter) = self.form_filter(key) {
                    sql.push_str(" AND ");
                    sql.push_str(&filter);
                }
                sql
            }
            QueryPurpose::Marker => {
                format!("SELECT COUNT(sg.geometry) + COUNT(sg.ref_point) {}", base)
            }
            QueryPurpose::Surfaces => {
                let mut sql = match key.theme {
                    Some(_) => format!(
                        "SELECT {}, {} FROM surface_geometry sg \
                         LEFT JOIN surface_data sd ON sd.surface_geometry_id = sg.id AND sd.theme = ?3 \
                         LEFT JOIN tex_image ti ON ti.id = sd.tex_image_id \
                         WHERE sg.cityobject_id = ?1 AND sg.lod = ?2",
                        SURFACE_COLUMNS, APPEARANCE_COLUMNS
                    ),
                    None => format!("SELECT {}, {} {}", SURFACE_COLUMNS, NO_APPEARANCE_COLUMNS, base),
                };
                if let Some(filter) = self.form_filter(key) {
                    sql.push_str(" AND ");
                    sql.push_str(&filter);
                }
                sql.push_str(" ORDER BY sg.id");
                sql
            }
            QueryPurpose::Aggregate => format!(
                "SELECT sg.id, sg.geometry {} AND sg.geometry IS NOT NULL \
                 AND (sg.thematic_class IS NULL OR sg.thematic_class NOT IN ({})) ORDER BY sg.id",
                base,
                closure_classes()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::DisplayForm;
    use crate::lod::ObjectClass;

    fn key(class: ObjectClass, form: DisplayForm, theme: Option<&str>) -> QueryKey {
        QueryKey { object_id: 1, class, lod: 2, form, theme: theme.map(str::to_string) }
    }

    #[test]
    fn test_footprint_filter_only_for_aggregating_classes() {
        let planner = SqlQueryPlanner;
        let building = planner.plan(&key(ObjectClass::Building, DisplayForm::Footprint, None), QueryPurpose::Existence);
        assert!(building.contains("role = 'footprint'"));
        let water = planner.plan(&key(ObjectClass::WaterBody, DisplayForm::Footprint, None), QueryPurpose::Existence);
        assert!(!water.contains("role = 'footprint'"));
        let geometry = planner.plan(&key(ObjectClass::Building, DisplayForm::Geometry, None), QueryPurpose::Existence);
        assert!(!geometry.contains("role = 'footprint'"));
    }

    #[test]
    fn test_theme_parameter_only_with_theme() {
        let planner = SqlQueryPlanner;
        let themed = planner.plan(&key(ObjectClass::Building, DisplayForm::Collada, Some("rgb")), QueryPurpose::Surfaces);
        assert!(themed.contains("?3"));
        let plain = planner.plan(&key(ObjectClass::Building, DisplayForm::Collada, None), QueryPurpose::Surfaces);
        assert!(!plain.contains("?3"));
    }

    #[test]
    fn test_implicit_rows_only_for_template_classes() {
        let planner = SqlQueryPlanner;
        let building = planner.plan(&key(ObjectClass::Building, DisplayForm::Geometry, None), QueryPurpose::Surfaces);
        assert!(building.contains("sg.role <> 'implicit'"));
        let furniture = planner.plan(&key(ObjectClass::CityFurniture, DisplayForm::Geometry, None), QueryPurpose::Surfaces);
        assert!(!furniture.contains("implicit"));
    }

    #[test]
    fn test_aggregate_skips_closure_surfaces() {
        let planner = SqlQueryPlanner;
        let sql = planner.plan(&key(ObjectClass::Building, DisplayForm::Footprint, None), QueryPurpose::Aggregate);
        assert!(sql.contains("NOT IN (36, 67, 89)"));
    }
}
