//! Export tasks and display forms

use crate::lod::ObjectClass;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rendering mode requested for a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayForm {
    Footprint,
    Extruded,
    Geometry,
    Collada,
}

impl DisplayForm {
    pub const ALL: [DisplayForm; 4] =
        [DisplayForm::Footprint, DisplayForm::Extruded, DisplayForm::Geometry, DisplayForm::Collada];

    /// Whether geometry stored at `lod` can be shown in this form.
    /// A footprint can be derived from any LOD; surfaces need at least LOD 1.
    pub fn is_achievable_from(self, lod: u8) -> bool {
        match self {
            DisplayForm::Footprint | DisplayForm::Extruded => lod <= 4,
            DisplayForm::Geometry | DisplayForm::Collada => (1..=4).contains(&lod),
        }
    }

    /// Forms that only need to know whether geometry exists before fetching it
    pub fn is_footprint_based(self) -> bool {
        matches!(self, DisplayForm::Footprint | DisplayForm::Extruded)
    }

    pub fn name(self) -> &'static str {
        match self {
            DisplayForm::Footprint => "footprint",
            DisplayForm::Extruded => "extruded",
            DisplayForm::Geometry => "geometry",
            DisplayForm::Collada => "collada",
        }
    }
}

impl fmt::Display for DisplayForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DisplayForm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DisplayForm::ALL
            .into_iter()
            .find(|form| form.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown display form '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySelection {
    pub form: DisplayForm,
    /// Also emit an offset highlight shell
    pub highlight: bool,
}

impl DisplaySelection {
    pub fn new(form: DisplayForm) -> Self {
        Self { form, highlight: false }
    }

    pub fn with_highlight(mut self, highlight: bool) -> Self {
        self.highlight = highlight;
        self
    }
}

/// One city object to export. Tasks sharing a `group` end up in one output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportTask {
    pub id: i64,
    pub gml_id: String,
    pub class: ObjectClass,
    pub display: DisplaySelection,
    pub group: Option<String>,
}

impl ExportTask {
    pub fn new(id: i64, gml_id: impl Into<String>, class: ObjectClass, display: DisplaySelection) -> Self {
        Self { id, gml_id: gml_id.into(), class, display, group: None }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Key tasks are grouped by; ungrouped tasks are their own group
    pub fn group_key(&self) -> &str {
        self.group.as_deref().unwrap_or(&self.gml_id)
    }
}
