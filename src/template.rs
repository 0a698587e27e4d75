//! # Template Store
//!
//! A template is a page size, an optional background image and an ordered
//! list of field groups. This crate renders a single page, so only the first
//! group is used. Fields paint in list order: later fields cover earlier ones.
//!
//! Coordinates are template space in millimetres, origin at the top-left
//! corner of the page. Font sizes are points.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ::image::DynamicImage;
use log::{info, warn};
use serde::Deserialize;

use crate::assets::fetch_bytes;
use crate::error::DiplomaError;

/// Built-in diploma page size in mm
pub const DIPLOMA_PAGE_WIDTH_MM: f32 = 850.0;
pub const DIPLOMA_PAGE_HEIGHT_MM: f32 = 640.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl FromStr for Alignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Alignment::Left),
            "center" => Ok(Alignment::Center),
            "right" => Ok(Alignment::Right),
            other => Err(format!("unknown alignment '{}'", other)),
        }
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        };
        f.write_str(name)
    }
}

/// A named, positioned text placeholder
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    #[serde(default)]
    pub font_size: f32,
    #[serde(default)]
    pub alignment: Alignment,
    #[serde(default)]
    pub font_name: Option<String>,
    /// `#RRGGBB` or `#RGB`; black when unset
    #[serde(default)]
    pub font_color: Option<String>,
}

impl FieldDescriptor {
    pub fn text(name: &str, x: f32, y: f32, width: f32, height: f32, font_size: f32) -> Self {
        Self {
            name: name.to_string(),
            position: Position { x, y },
            width,
            height,
            font_size,
            alignment: Alignment::Left,
            font_name: None,
            font_color: None,
        }
    }

    pub fn aligned(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn font(mut self, font_name: &str) -> Self {
        self.font_name = Some(font_name.to_string());
        self
    }

    pub fn color(mut self, font_color: &str) -> Self {
        self.font_color = Some(font_color.to_string());
        self
    }
}

/// Background image painted under every field
#[derive(Debug, Clone)]
pub struct Background {
    pub source: String,
    pub image: Arc<DynamicImage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    #[serde(default = "default_page_width")]
    pub page_width: f32,
    #[serde(default = "default_page_height")]
    pub page_height: f32,
    #[serde(skip)]
    pub background: Option<Background>,
    pub schemas: Vec<Vec<FieldDescriptor>>,
}

fn default_page_width() -> f32 {
    DIPLOMA_PAGE_WIDTH_MM
}

fn default_page_height() -> f32 {
    DIPLOMA_PAGE_HEIGHT_MM
}

impl Template {
    /// The built-in diploma layout.
    pub fn diploma() -> Self {
        Self {
            page_width: DIPLOMA_PAGE_WIDTH_MM,
            page_height: DIPLOMA_PAGE_HEIGHT_MM,
            background: None,
            schemas: vec![vec![
                FieldDescriptor::text("id", 28.0, 581.5, 200.0, 30.0, 45.0),
                FieldDescriptor::text("name", 100.0, 260.0, 700.0, 100.0, 95.0)
                    .aligned(Alignment::Center)
                    .font("andalus"),
                FieldDescriptor::text("birthDate", 255.0, 310.0, 400.0, 100.0, 95.0)
                    .aligned(Alignment::Center),
                FieldDescriptor::text("diploma", 255.0, 390.0, 400.0, 100.0, 95.0)
                    .aligned(Alignment::Center)
                    .color("#FF0000"),
                FieldDescriptor::text("todayDate", 90.0, 560.0, 100.0, 10.0, 45.0),
                FieldDescriptor::text("startDate", 56.0, 605.0, 100.0, 10.0, 45.0),
                FieldDescriptor::text("endDate", 181.0, 605.0, 100.0, 10.0, 45.0),
            ]],
        }
    }

    /// Parses a JSON layout. Unknown keys (such as a field `type`) are ignored.
    pub fn from_json(json: &str) -> Result<Self, DiplomaError> {
        let template: Template =
            serde_json::from_str(json).map_err(|e| DiplomaError::Template(format!("Invalid JSON: {}", e)))?;

        template.check_field_names()?;
        Ok(template)
    }

    fn check_field_names(&self) -> Result<(), DiplomaError> {
        let mut names = std::collections::BTreeSet::new();
        for field in self.fields() {
            if field.name.is_empty() {
                return Err(DiplomaError::InvalidField("field name must not be empty".to_string()));
            }
            if !names.insert(field.name.as_str()) {
                return Err(DiplomaError::DuplicateFieldName(field.name.clone()));
            }
        }
        Ok(())
    }

    pub fn from_file(path: &str) -> Result<Self, DiplomaError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DiplomaError::Template(format!("{}: {}", path, e)))?;
        Self::from_json(&content)
    }

    /// Loads the background image from a file path or URL.
    pub fn load_background(&mut self, location: &str, timeout: Option<Duration>) -> Result<(), DiplomaError> {
        let bytes = fetch_bytes(location, timeout).map_err(DiplomaError::Template)?;
        let image = ::image::load_from_memory(&bytes)
            .map_err(|e| DiplomaError::Template(format!("Failed to decode background image: {}", e)))?;

        info!(
            "Loaded background {} ({}x{} px)",
            location,
            image.width(),
            image.height()
        );
        self.background = Some(Background {
            source: location.to_string(),
            image: Arc::new(image),
        });
        Ok(())
    }

    /// All fields across every group, in paint order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.schemas.iter().flatten()
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.fields().any(|field| field.name == name)
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::diploma()
    }
}

/// Owns the shared template. Readers take an `Arc` snapshot; `add_field`
/// copies on write so a snapshot already handed out never changes.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    template: Arc<Template>,
}

impl TemplateStore {
    pub fn new(template: Template) -> Self {
        Self {
            template: Arc::new(template),
        }
    }

    /// Fields of the single group used for rendering.
    pub fn schema(&self) -> &[FieldDescriptor] {
        self.template
            .schemas
            .first()
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn snapshot(&self) -> Arc<Template> {
        Arc::clone(&self.template)
    }

    /// Appends `descriptor` to the first field group.
    pub fn add_field(&mut self, descriptor: FieldDescriptor) -> Result<(), DiplomaError> {
        if descriptor.name.is_empty() {
            return Err(DiplomaError::InvalidField("field name must not be empty".to_string()));
        }
        if self.template.contains_field(&descriptor.name) {
            return Err(DiplomaError::DuplicateFieldName(descriptor.name));
        }

        info!(
            "Adding field '{}' at ({}, {})",
            descriptor.name, descriptor.position.x, descriptor.position.y
        );
        let template = Arc::make_mut(&mut self.template);
        if template.schemas.is_empty() {
            template.schemas.push(Vec::new());
        }
        template.schemas[0].push(descriptor);
        Ok(())
    }
}

/// Operator input for a new field. Numbers default to 0 and strings to empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldEdit {
    pub name: String,
    /// Constant text for the field in every generated document
    pub content: Option<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub font_size: f32,
    pub alignment: String,
    pub font_color: String,
}

impl FieldEdit {
    pub fn descriptor(&self) -> FieldDescriptor {
        let alignment = if self.alignment.is_empty() {
            Alignment::Left
        } else {
            self.alignment.parse().unwrap_or_else(|e| {
                warn!("Field '{}': {}, using left", self.name, e);
                Alignment::Left
            })
        };

        FieldDescriptor {
            name: self.name.clone(),
            position: Position {
                x: self.x,
                y: self.y,
            },
            width: self.width,
            height: self.height,
            font_size: self.font_size,
            alignment,
            font_name: None,
            font_color: (!self.font_color.is_empty()).then(|| self.font_color.clone()),
        }
    }
}

/// Reads a JSON array of field edits.
pub fn load_field_edits(path: &str) -> Result<Vec<FieldEdit>, DiplomaError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| DiplomaError::InvalidField(format!("{}: {}", path, e)))?;
    serde_json::from_str(&content)
        .map_err(|e| DiplomaError::InvalidField(format!("Invalid JSON in {}: {}", path, e)))
}
