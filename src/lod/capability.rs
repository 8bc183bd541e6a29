//! Per-class capabilities driving LOD resolution
//!
//! Every kind of city object is resolved by the same engine; what differs
//! between them is captured in a [`ClassCapability`] record: the lowest LOD
//! the class can exist at, the display forms it supports, how a probe decides
//! that a LOD has geometry, and whether a footprint may be aggregated from
//! the class's surfaces.

use crate::export::DisplayForm;
use serde::{Deserialize, Serialize};

/// Kind of city object being exported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Building,
    Bridge,
    Tunnel,
    CityFurniture,
    GenericCityObject,
    SolitaryVegetation,
    PlantCover,
    WaterBody,
    LandUse,
    Transportation,
    Relief,
}

/// Store class ids of the top-level object classes
pub mod class_id {
    pub const LAND_USE: i32 = 4;
    pub const GENERIC_CITY_OBJECT: i32 = 5;
    pub const SOLITARY_VEGETATION: i32 = 7;
    pub const PLANT_COVER: i32 = 8;
    pub const WATER_BODY: i32 = 9;
    pub const RELIEF: i32 = 14;
    pub const CITY_FURNITURE: i32 = 21;
    pub const BUILDING_PART: i32 = 25;
    pub const BUILDING: i32 = 26;
    pub const TRANSPORTATION: i32 = 42;
    pub const BRIDGE_PART: i32 = 63;
    pub const BRIDGE: i32 = 64;
    pub const TUNNEL_PART: i32 = 84;
    pub const TUNNEL: i32 = 85;
}

/// Store class ids of thematic boundary surfaces
pub mod surface_class_id {
    pub const BUILDING_ROOF: i32 = 33;
    pub const BUILDING_WALL: i32 = 34;
    pub const BUILDING_GROUND: i32 = 35;
    pub const BUILDING_CLOSURE: i32 = 36;
    pub const BRIDGE_CLOSURE: i32 = 67;
    pub const BRIDGE_GROUND: i32 = 68;
    pub const BRIDGE_ROOF: i32 = 70;
    pub const BRIDGE_WALL: i32 = 71;
    pub const TUNNEL_CLOSURE: i32 = 89;
    pub const TUNNEL_GROUND: i32 = 90;
    pub const TUNNEL_ROOF: i32 = 92;
    pub const TUNNEL_WALL: i32 = 93;
}

/// Semantic type of a boundary surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceKind {
    Roof,
    Wall,
    Ground,
    Closure,
}

impl SurfaceKind {
    pub fn from_class_id(id: i32) -> Option<Self> {
        use surface_class_id::*;
        match id {
            BUILDING_ROOF | BRIDGE_ROOF | TUNNEL_ROOF => Some(SurfaceKind::Roof),
            BUILDING_WALL | BRIDGE_WALL | TUNNEL_WALL => Some(SurfaceKind::Wall),
            BUILDING_GROUND | BRIDGE_GROUND | TUNNEL_GROUND => Some(SurfaceKind::Ground),
            BUILDING_CLOSURE | BRIDGE_CLOSURE | TUNNEL_CLOSURE => Some(SurfaceKind::Closure),
            _ => None,
        }
    }

    /// Label used for the per-type groups of the geometry form
    pub fn label(self) -> &'static str {
        match self {
            SurfaceKind::Roof => "Roof",
            SurfaceKind::Wall => "Wall",
            SurfaceKind::Ground => "Ground",
            SurfaceKind::Closure => "Closure",
        }
    }
}

/// How a probe decides that a LOD holds geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeRule {
    /// At least one surface row exists
    AnyRow,
    /// The explicit-or-implicit geometry marker is non-zero. Used by classes
    /// whose rows mix explicit and implicit geometry.
    MarkerNonZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassCapability {
    pub class: ObjectClass,
    /// Lowest LOD the class can be stored at
    pub lod_floor: u8,
    pub forms: &'static [DisplayForm],
    pub probe_rule: ProbeRule,
    /// Footprints may be unioned from all surfaces when none is stored
    pub aggregates_footprint: bool,
    /// Template instances with a reference point and transform may appear
    pub supports_implicit: bool,
    /// Thematic surfaces carry roof/wall/ground typing
    pub has_thematic_surfaces: bool,
}

const ALL_FORMS: &[DisplayForm] = &DisplayForm::ALL;

/// Surface-like classes have no height to extrude by
const SURFACE_FORMS: &[DisplayForm] = &[DisplayForm::Footprint, DisplayForm::Geometry, DisplayForm::Collada];

impl ObjectClass {
    pub const ALL: [ObjectClass; 11] = [
        ObjectClass::Building,
        ObjectClass::Bridge,
        ObjectClass::Tunnel,
        ObjectClass::CityFurniture,
        ObjectClass::GenericCityObject,
        ObjectClass::SolitaryVegetation,
        ObjectClass::PlantCover,
        ObjectClass::WaterBody,
        ObjectClass::LandUse,
        ObjectClass::Transportation,
        ObjectClass::Relief,
    ];

    pub fn capability(self) -> ClassCapability {
        use ObjectClass::*;
        let (lod_floor, forms, probe_rule, aggregates_footprint, supports_implicit, has_thematic_surfaces) = match self {
            Building => (0, ALL_FORMS, ProbeRule::AnyRow, true, false, true),
            Bridge | Tunnel => (1, ALL_FORMS, ProbeRule::AnyRow, true, false, true),
            CityFurniture | SolitaryVegetation => (1, ALL_FORMS, ProbeRule::MarkerNonZero, false, true, false),
            GenericCityObject => (0, ALL_FORMS, ProbeRule::MarkerNonZero, false, true, false),
            PlantCover | WaterBody | Transportation => (1, SURFACE_FORMS, ProbeRule::AnyRow, false, false, false),
            LandUse | Relief => (0, SURFACE_FORMS, ProbeRule::AnyRow, false, false, false),
        };
        ClassCapability {
            class: self,
            lod_floor,
            forms,
            probe_rule,
            aggregates_footprint,
            supports_implicit,
            has_thematic_surfaces,
        }
    }

    /// Map a store class id to the object class exported for it.
    /// Parts are exported as their parent class.
    pub fn from_class_id(id: i32) -> Option<Self> {
        use class_id::*;
        Some(match id {
            BUILDING | BUILDING_PART => ObjectClass::Building,
            BRIDGE | BRIDGE_PART => ObjectClass::Bridge,
            TUNNEL | TUNNEL_PART => ObjectClass::Tunnel,
            CITY_FURNITURE => ObjectClass::CityFurniture,
            GENERIC_CITY_OBJECT => ObjectClass::GenericCityObject,
            SOLITARY_VEGETATION => ObjectClass::SolitaryVegetation,
            PLANT_COVER => ObjectClass::PlantCover,
            WATER_BODY => ObjectClass::WaterBody,
            LAND_USE => ObjectClass::LandUse,
            TRANSPORTATION => ObjectClass::Transportation,
            RELIEF => ObjectClass::Relief,
            _ => return None,
        })
    }

    pub fn class_id(self) -> i32 {
        use class_id::*;
        match self {
            ObjectClass::Building => BUILDING,
            ObjectClass::Bridge => BRIDGE,
            ObjectClass::Tunnel => TUNNEL,
            ObjectClass::CityFurniture => CITY_FURNITURE,
            ObjectClass::GenericCityObject => GENERIC_CITY_OBJECT,
            ObjectClass::SolitaryVegetation => SOLITARY_VEGETATION,
            ObjectClass::PlantCover => PLANT_COVER,
            ObjectClass::WaterBody => WATER_BODY,
            ObjectClass::LandUse => LAND_USE,
            ObjectClass::Transportation => TRANSPORTATION,
            ObjectClass::Relief => RELIEF,
        }
    }

    /// Style basis name used in emitted style ids
    pub fn style_name(self) -> &'static str {
        match self {
            ObjectClass::Building => "Building",
            ObjectClass::Bridge => "Bridge",
            ObjectClass::Tunnel => "Tunnel",
            ObjectClass::CityFurniture => "CityFurniture",
            ObjectClass::GenericCityObject => "GenericCityObject",
            ObjectClass::SolitaryVegetation => "SolitaryVegetationObject",
            ObjectClass::PlantCover => "PlantCover",
            ObjectClass::WaterBody => "WaterBody",
            ObjectClass::LandUse => "LandUse",
            ObjectClass::Transportation => "Transportation",
            ObjectClass::Relief => "Relief",
        }
    }
}

impl ClassCapability {
    pub fn supports(&self, form: DisplayForm) -> bool {
        self.forms.contains(&form)
    }
}
