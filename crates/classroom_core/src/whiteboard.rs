//! crates/classroom_core/src/whiteboard.rs
//!
//! The shared whiteboard's object graph and undo history.
//!
//! Rendering happens in the browser's canvas library; this module owns the
//! authoritative list of drawable objects, applies learner edits and AI tool
//! calls to it, and keeps serialized snapshots for undo/redo.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engagement::Point;

pub type ObjectId = u64;

const DEFAULT_WIDTH: f64 = 960.0;
const DEFAULT_HEIGHT: f64 = 540.0;
const DEFAULT_COLOR: &str = "#000000";
const DEFAULT_BRUSH_WIDTH: f64 = 5.0;
const TRANSPARENT: &str = "transparent";
/// Undo states kept, the current one included.
const MAX_HISTORY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WhiteboardError {
    #[error("No object with id {0}")]
    UnknownObject(ObjectId),
    #[error("Object {0} is not a video")]
    NotAVideo(ObjectId),
    #[error("The {0:?} tool is required for this action")]
    WrongTool(Tool),
    #[error("A path needs at least two points")]
    EmptyPath,
    #[error("Unknown whiteboard tool call: {0}")]
    UnknownToolCall(String),
    #[error("Invalid arguments for {name}: {reason}")]
    InvalidArguments { name: String, reason: String },
}

//=========================================================================================
// Objects
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ObjectKind {
    Textbox {
        text: String,
        font_size: f64,
    },
    Rect,
    Circle {
        radius: f64,
    },
    Line {
        x2: f64,
        y2: f64,
    },
    Path {
        points: Vec<Point>,
    },
    Image {
        src: String,
    },
    Video {
        src: String,
        // Playback is live state, not part of the saved drawing.
        #[serde(skip)]
        playing: bool,
    },
}

impl ObjectKind {
    fn type_name(&self) -> &'static str {
        match self {
            ObjectKind::Textbox { .. } => "textbox",
            ObjectKind::Rect => "rect",
            ObjectKind::Circle { .. } => "circle",
            ObjectKind::Line { .. } => "line",
            ObjectKind::Path { .. } => "path",
            ObjectKind::Image { .. } => "image",
            ObjectKind::Video { .. } => "video",
        }
    }

    fn is_stroke_only(&self) -> bool {
        matches!(self, ObjectKind::Line { .. } | ObjectKind::Path { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasObject {
    pub id: ObjectId,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub stroke_width: f64,
    #[serde(flatten)]
    pub kind: ObjectKind,
}

/// The simplified description of an object handed to the AI tutor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSummary {
    #[serde(rename = "type")]
    pub object_type: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl From<&CanvasObject> for ObjectSummary {
    fn from(obj: &CanvasObject) -> Self {
        let text = match &obj.kind {
            ObjectKind::Textbox { text, .. } => Some(text.clone()),
            _ => None,
        };
        Self {
            object_type: obj.kind.type_name().to_string(),
            left: obj.left,
            top: obj.top,
            width: obj.width * obj.scale_x,
            height: obj.height * obj.scale_y,
            fill: obj.fill.clone(),
            stroke: obj.stroke.clone(),
            text,
        }
    }
}

/// Read-only snapshot for the AI gateway: object list plus the last rendered screenshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhiteboardState {
    pub objects: Vec<ObjectSummary>,
    /// Base64 PNG of the canvas as last rendered by the client.
    pub image: Option<String>,
}

impl WhiteboardState {
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Everything the client needs to redraw the board and its toolbar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhiteboardView {
    pub objects: Vec<CanvasObject>,
    pub selected: Option<ObjectId>,
    pub tool: Tool,
    pub color: String,
    pub brush_width: f64,
    pub can_undo: bool,
    pub can_redo: bool,
    pub render_loop_active: bool,
}

//=========================================================================================
// Tools, Options and AI Tool Calls
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Select,
    Pen,
    Eraser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeType {
    Rect,
    Circle,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoAction {
    Play,
    Pause,
    Stop,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextOptions {
    pub left: Option<f64>,
    pub top: Option<f64>,
    pub color: Option<String>,
    pub font_size: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShapeOptions {
    pub left: Option<f64>,
    pub top: Option<f64>,
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub stroke_width: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub radius: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOptions {
    pub left: Option<f64>,
    pub top: Option<f64>,
}

/// A whiteboard operation requested by the AI tutor.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    AddText { text: String, options: TextOptions },
    AddShape { shape_type: ShapeType, options: ShapeOptions },
    AddImage { prompt: String, options: ImageOptions },
    ClearCanvas,
}

#[derive(Deserialize)]
struct AddTextArgs {
    text: String,
    #[serde(default)]
    options: TextOptions,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddShapeArgs {
    shape_type: ShapeType,
    #[serde(default)]
    options: ShapeOptions,
}

#[derive(Deserialize)]
struct AddImageArgs {
    prompt: String,
    #[serde(default)]
    options: ImageOptions,
}

impl ToolCall {
    /// Parses a function call emitted by the model (`addText`, `addShape`, `addImage`, `clearCanvas`).
    pub fn from_function(name: &str, arguments: &str) -> Result<Self, WhiteboardError> {
        let invalid = |e: serde_json::Error| WhiteboardError::InvalidArguments {
            name: name.to_string(),
            reason: e.to_string(),
        };
        let arguments = if arguments.trim().is_empty() { "{}" } else { arguments };

        match name {
            "addText" => {
                let args: AddTextArgs = serde_json::from_str(arguments).map_err(invalid)?;
                Ok(ToolCall::AddText {
                    text: args.text,
                    options: args.options,
                })
            }
            "addShape" => {
                let args: AddShapeArgs = serde_json::from_str(arguments).map_err(invalid)?;
                if args.shape_type == ShapeType::Line {
                    return Err(WhiteboardError::InvalidArguments {
                        name: name.to_string(),
                        reason: "shapeType must be 'rect' or 'circle'".to_string(),
                    });
                }
                Ok(ToolCall::AddShape {
                    shape_type: args.shape_type,
                    options: args.options,
                })
            }
            "addImage" => {
                let args: AddImageArgs = serde_json::from_str(arguments).map_err(invalid)?;
                Ok(ToolCall::AddImage {
                    prompt: args.prompt,
                    options: args.options,
                })
            }
            "clearCanvas" => Ok(ToolCall::ClearCanvas),
            other => Err(WhiteboardError::UnknownToolCall(other.to_string())),
        }
    }
}

/// What applying a tool call left for the caller to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Applied,
    /// The image must be generated first, then passed to [`Whiteboard::add_image`].
    ImageRequested { prompt: String, options: ImageOptions },
}

//=========================================================================================
// The Whiteboard
//=========================================================================================

#[derive(Serialize, Deserialize)]
struct Snapshot {
    objects: Vec<CanvasObject>,
}

pub struct Whiteboard {
    width: f64,
    height: f64,
    objects: Vec<CanvasObject>,
    next_id: ObjectId,
    selected: Option<ObjectId>,
    tool: Tool,
    color: String,
    brush_width: f64,
    history: Vec<String>,
    cursor: usize,
    rendered_image: Option<String>,
    render_loop_active: bool,
}

impl Default for Whiteboard {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl Whiteboard {
    pub fn new(width: f64, height: f64) -> Self {
        let mut board = Self {
            width,
            height,
            objects: Vec::new(),
            next_id: 1,
            selected: None,
            tool: Tool::Select,
            color: DEFAULT_COLOR.to_string(),
            brush_width: DEFAULT_BRUSH_WIDTH,
            history: Vec::new(),
            cursor: 0,
            rendered_image: None,
            render_loop_active: false,
        };
        board.save_state();
        board
    }

    //=========================================================================================
    // Read side
    //=========================================================================================

    pub fn objects(&self) -> &[CanvasObject] {
        &self.objects
    }

    pub fn get_state(&self) -> WhiteboardState {
        WhiteboardState {
            objects: self.objects.iter().map(ObjectSummary::from).collect(),
            image: self.rendered_image.clone(),
        }
    }

    pub fn view(&self) -> WhiteboardView {
        WhiteboardView {
            objects: self.objects.clone(),
            selected: self.selected,
            tool: self.tool,
            color: self.color.clone(),
            brush_width: self.brush_width,
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            render_loop_active: self.render_loop_active,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.history.len()
    }

    /// True while at least one video object is playing.
    pub fn render_loop_running(&self) -> bool {
        self.render_loop_active
    }

    /// The serialized snapshot at the history cursor.
    pub fn current_snapshot(&self) -> &str {
        &self.history[self.cursor]
    }

    /// Stores the screenshot the client rendered after its last redraw.
    pub fn set_rendered_image(&mut self, image: String) {
        self.rendered_image = Some(image);
    }

    //=========================================================================================
    // Tool settings
    //=========================================================================================

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        if tool != Tool::Select {
            self.selected = None;
        }
    }

    /// Changes the drawing colour and recolours the selection.
    pub fn set_color(&mut self, color: &str) {
        self.color = color.to_string();
        let Some(obj) = self.selected_mut() else { return };
        if obj.kind.is_stroke_only() {
            obj.stroke = Some(color.to_string());
        } else {
            obj.fill = Some(color.to_string());
        }
        self.save_state();
    }

    /// Changes the brush width; selected lines and paths follow it.
    pub fn set_brush_width(&mut self, width: f64) {
        self.brush_width = width;
        let Some(obj) = self.selected_mut() else { return };
        if obj.kind.is_stroke_only() {
            obj.stroke_width = width;
            self.save_state();
        }
    }

    //=========================================================================================
    // Adding objects
    //=========================================================================================

    pub fn add_text(&mut self, text: &str, options: &TextOptions) -> ObjectId {
        let font_size = options.font_size.unwrap_or(20.0);
        let kind = ObjectKind::Textbox {
            text: text.to_string(),
            font_size,
        };
        let obj = self.new_object(
            options.left.unwrap_or(100.0),
            options.top.unwrap_or(100.0),
            self.width * 0.7,
            font_size * 1.25,
            Some(options.color.clone().unwrap_or_else(|| self.color.clone())),
            None,
            kind,
        );
        self.push_object(obj)
    }

    pub fn add_shape(&mut self, shape_type: ShapeType, options: &ShapeOptions) -> ObjectId {
        let left = options.left.unwrap_or(150.0);
        let top = options.top.unwrap_or(150.0);
        let (width, height, kind) = match shape_type {
            ShapeType::Rect => (
                options.width.unwrap_or(100.0),
                options.height.unwrap_or(100.0),
                ObjectKind::Rect,
            ),
            ShapeType::Circle => {
                let radius = options.radius.unwrap_or(50.0);
                (radius * 2.0, radius * 2.0, ObjectKind::Circle { radius })
            }
            ShapeType::Line => {
                let length = options.width.unwrap_or(150.0);
                (length, 0.0, ObjectKind::Line { x2: left + length, y2: top })
            }
        };
        let mut obj = self.new_object(
            left,
            top,
            width,
            height,
            Some(options.fill.clone().unwrap_or_else(|| TRANSPARENT.to_string())),
            Some(options.stroke.clone().unwrap_or_else(|| self.color.clone())),
            kind,
        );
        obj.stroke_width = options.stroke_width.unwrap_or(self.brush_width);
        self.push_object(obj)
    }

    /// Adds an image scaled to half the board width.
    pub fn add_image(&mut self, url: &str, options: &ImageOptions) -> ObjectId {
        let width = self.width * 0.5;
        let obj = self.new_object(
            options.left.unwrap_or(100.0),
            options.top.unwrap_or(100.0),
            width,
            width * 9.0 / 16.0,
            None,
            None,
            ObjectKind::Image {
                src: url.to_string(),
            },
        );
        self.push_object(obj)
    }

    /// Adds a video and starts it, which starts the render loop.
    pub fn add_video(&mut self, url: &str) -> ObjectId {
        let width = self.width * 0.5;
        let obj = self.new_object(
            100.0,
            100.0,
            width,
            width * 9.0 / 16.0,
            None,
            None,
            ObjectKind::Video {
                src: url.to_string(),
                playing: true,
            },
        );
        let id = self.push_object(obj);
        self.sync_render_loop();
        id
    }

    /// Records a freehand pen stroke.
    pub fn draw_path(&mut self, points: Vec<Point>) -> Result<ObjectId, WhiteboardError> {
        if self.tool != Tool::Pen {
            return Err(WhiteboardError::WrongTool(Tool::Pen));
        }
        if points.len() < 2 {
            return Err(WhiteboardError::EmptyPath);
        }
        let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

        let mut obj = self.new_object(
            min_x,
            min_y,
            max_x - min_x,
            max_y - min_y,
            None,
            Some(self.color.clone()),
            ObjectKind::Path { points },
        );
        obj.stroke_width = self.brush_width;
        Ok(self.push_object(obj))
    }

    //=========================================================================================
    // Editing
    //=========================================================================================

    pub fn select(&mut self, id: Option<ObjectId>) -> Result<(), WhiteboardError> {
        if let Some(id) = id {
            self.index_of(id)?;
        }
        self.selected = id;
        Ok(())
    }

    pub fn move_object(&mut self, id: ObjectId, left: f64, top: f64) -> Result<(), WhiteboardError> {
        let index = self.index_of(id)?;
        let obj = &mut self.objects[index];
        obj.left = left;
        obj.top = top;
        self.save_state();
        Ok(())
    }

    /// Removes the object under the eraser.
    pub fn erase(&mut self, id: ObjectId) -> Result<(), WhiteboardError> {
        if self.tool != Tool::Eraser {
            return Err(WhiteboardError::WrongTool(Tool::Eraser));
        }
        self.remove(id)?;
        self.save_state();
        Ok(())
    }

    /// Deletes the current selection. Returns whether anything was deleted.
    pub fn delete_selected(&mut self) -> bool {
        let Some(id) = self.selected.take() else {
            return false;
        };
        if self.remove(id).is_err() {
            return false;
        }
        self.save_state();
        true
    }

    /// Keyboard shortcut handling: Delete and Backspace remove the selection.
    pub fn key_down(&mut self, key: &str) -> bool {
        match key {
            "Delete" | "Backspace" => self.delete_selected(),
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.stop_videos();
        self.objects.clear();
        self.selected = None;
        self.sync_render_loop();
        self.save_state();
    }

    pub fn video_control(&mut self, id: ObjectId, action: VideoAction) -> Result<(), WhiteboardError> {
        let index = self.index_of(id)?;
        match &mut self.objects[index].kind {
            ObjectKind::Video { playing, .. } => {
                *playing = action == VideoAction::Play;
            }
            _ => return Err(WhiteboardError::NotAVideo(id)),
        }
        self.sync_render_loop();
        Ok(())
    }

    //=========================================================================================
    // History
    //=========================================================================================

    pub fn undo(&mut self) -> bool {
        if !self.can_undo() {
            return false;
        }
        self.cursor -= 1;
        self.restore();
        true
    }

    pub fn redo(&mut self) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.cursor += 1;
        self.restore();
        true
    }

    //=========================================================================================
    // AI tool calls
    //=========================================================================================

    pub fn apply_tool_call(&mut self, call: &ToolCall) -> ToolOutcome {
        match call {
            ToolCall::AddText { text, options } => {
                self.add_text(text, options);
            }
            ToolCall::AddShape { shape_type, options } => {
                self.add_shape(*shape_type, options);
            }
            ToolCall::AddImage { prompt, options } => {
                return ToolOutcome::ImageRequested {
                    prompt: prompt.clone(),
                    options: options.clone(),
                };
            }
            ToolCall::ClearCanvas => self.clear(),
        }
        ToolOutcome::Applied
    }

    //=========================================================================================
    // Internals
    //=========================================================================================

    #[allow(clippy::too_many_arguments)]
    fn new_object(
        &mut self,
        left: f64,
        top: f64,
        width: f64,
        height: f64,
        fill: Option<String>,
        stroke: Option<String>,
        kind: ObjectKind,
    ) -> CanvasObject {
        let id = self.next_id;
        self.next_id += 1;
        CanvasObject {
            id,
            left,
            top,
            width,
            height,
            scale_x: 1.0,
            scale_y: 1.0,
            fill,
            stroke,
            stroke_width: 1.0,
            kind,
        }
    }

    fn push_object(&mut self, obj: CanvasObject) -> ObjectId {
        let id = obj.id;
        self.objects.push(obj);
        self.save_state();
        id
    }

    fn index_of(&self, id: ObjectId) -> Result<usize, WhiteboardError> {
        self.objects
            .iter()
            .position(|o| o.id == id)
            .ok_or(WhiteboardError::UnknownObject(id))
    }

    fn selected_mut(&mut self) -> Option<&mut CanvasObject> {
        let id = self.selected?;
        self.objects.iter_mut().find(|o| o.id == id)
    }

    fn remove(&mut self, id: ObjectId) -> Result<CanvasObject, WhiteboardError> {
        let index = self.index_of(id)?;
        let removed = self.objects.remove(index);
        if self.selected == Some(id) {
            self.selected = None;
        }
        self.sync_render_loop();
        Ok(removed)
    }

    fn stop_videos(&mut self) {
        for obj in &mut self.objects {
            if let ObjectKind::Video { playing, .. } = &mut obj.kind {
                *playing = false;
            }
        }
        self.sync_render_loop();
    }

    fn sync_render_loop(&mut self) {
        let wanted = self
            .objects
            .iter()
            .any(|o| matches!(o.kind, ObjectKind::Video { playing: true, .. }));
        if wanted != self.render_loop_active {
            debug!(active = wanted, "Whiteboard video render loop toggled");
            self.render_loop_active = wanted;
        }
    }

    /// Pushes the current objects as a new snapshot, dropping any redo states.
    fn save_state(&mut self) {
        let snapshot = match serde_json::to_string(&Snapshot {
            objects: self.objects.clone(),
        }) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize whiteboard snapshot: {}", e);
                return;
            }
        };
        if self.history.get(self.cursor) == Some(&snapshot) {
            return;
        }
        self.history.truncate(self.cursor + 1);
        self.history.push(snapshot);
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
        self.cursor = self.history.len() - 1;
    }

    fn restore(&mut self) {
        self.stop_videos();
        match serde_json::from_str::<Snapshot>(&self.history[self.cursor]) {
            Ok(snapshot) => {
                self.objects = snapshot.objects;
                self.selected = None;
            }
            Err(e) => warn!("Failed to restore whiteboard snapshot: {}", e),
        }
        self.sync_render_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_with_text() -> Whiteboard {
        let mut board = Whiteboard::default();
        board.add_text("Photosynthesis", &TextOptions::default());
        board
    }

    #[test]
    fn history_keeps_only_the_newest_states() {
        let mut board = Whiteboard::default();
        for i in 0..150 {
            board.add_text(&format!("Note {i}"), &TextOptions::default());
        }
        let mut undos = 0;
        while board.undo() {
            undos += 1;
        }
        assert_eq!(undos, MAX_HISTORY - 1);
        assert_eq!(board.objects().len(), 150 - (MAX_HISTORY - 1));
        assert!(board.redo());
    }

    #[test]
    fn new_board_has_nothing_to_undo() {
        let mut board = Whiteboard::default();
        assert!(!board.can_undo());
        assert!(!board.undo());
        assert!(!board.redo());
    }

    #[test]
    fn undo_then_redo_restores_exact_snapshot() {
        let mut board = board_with_text();
        board.add_shape(ShapeType::Circle, &ShapeOptions::default());
        let before = board.current_snapshot().to_string();
        let objects_before = board.objects().to_vec();

        assert!(board.undo());
        assert_eq!(board.objects().len(), 1);
        assert!(board.redo());

        assert_eq!(board.current_snapshot(), before);
        assert_eq!(board.objects(), objects_before.as_slice());
    }

    #[test]
    fn new_edit_after_undo_truncates_redo() {
        let mut board = board_with_text();
        board.add_shape(ShapeType::Rect, &ShapeOptions::default());
        assert!(board.undo());
        board.add_text("Chlorophyll", &TextOptions::default());

        assert!(!board.can_redo());
        assert!(!board.redo());
        assert_eq!(board.objects().len(), 2);
    }

    #[test]
    fn ai_defaults_match_toolbar_defaults() {
        let mut board = Whiteboard::default();
        board.add_shape(ShapeType::Circle, &ShapeOptions::default());
        let circle = &board.objects()[0];
        assert_eq!((circle.left, circle.top), (150.0, 150.0));
        assert_eq!(circle.fill.as_deref(), Some("transparent"));
        assert_eq!(circle.kind, ObjectKind::Circle { radius: 50.0 });
        assert_eq!(circle.stroke_width, 5.0);
    }

    #[test]
    fn state_summarizes_scaled_objects() {
        let mut board = board_with_text();
        board.set_rendered_image("iVBORw0".to_string());
        let state = board.get_state();
        assert_eq!(state.objects[0].object_type, "textbox");
        assert_eq!(state.objects[0].text.as_deref(), Some("Photosynthesis"));
        assert_eq!(state.image.as_deref(), Some("iVBORw0"));
    }

    #[test]
    fn recolouring_selected_path_changes_stroke() {
        let mut board = Whiteboard::default();
        board.set_tool(Tool::Pen);
        let id = board
            .draw_path(vec![Point { x: 0.0, y: 0.0 }, Point { x: 10.0, y: 5.0 }])
            .unwrap();
        board.set_tool(Tool::Select);
        board.select(Some(id)).unwrap();
        board.set_color("#ff0000");
        let path = &board.objects()[0];
        assert_eq!(path.stroke.as_deref(), Some("#ff0000"));
        assert_eq!(path.fill, None);
    }

    #[test]
    fn pen_strokes_require_the_pen() {
        let mut board = Whiteboard::default();
        let err = board
            .draw_path(vec![Point { x: 0.0, y: 0.0 }, Point { x: 1.0, y: 1.0 }])
            .unwrap_err();
        assert_eq!(err, WhiteboardError::WrongTool(Tool::Pen));
    }

    #[test]
    fn delete_key_removes_selection() {
        let mut board = board_with_text();
        let id = board.objects()[0].id;
        board.select(Some(id)).unwrap();
        assert!(board.key_down("Delete"));
        assert!(board.objects().is_empty());
        assert!(!board.key_down("Delete"));
    }

    #[test]
    fn render_loop_runs_only_while_a_video_plays() {
        let mut board = Whiteboard::default();
        let id = board.add_video("blob:video");
        assert!(board.render_loop_running());

        board.video_control(id, VideoAction::Pause).unwrap();
        assert!(!board.render_loop_running());

        board.video_control(id, VideoAction::Play).unwrap();
        board.clear();
        assert!(!board.render_loop_running());
    }

    #[test]
    fn undo_stops_playing_videos() {
        let mut board = Whiteboard::default();
        board.add_video("blob:video");
        board.add_text("caption", &TextOptions::default());
        assert!(board.undo());
        assert!(!board.render_loop_running());
    }

    #[test]
    fn tool_call_parsing() {
        let call = ToolCall::from_function(
            "addText",
            r#"{"text": "H2O", "options": {"left": 10, "fontSize": 32}}"#,
        )
        .unwrap();
        assert_eq!(
            call,
            ToolCall::AddText {
                text: "H2O".to_string(),
                options: TextOptions {
                    left: Some(10.0),
                    font_size: Some(32.0),
                    ..TextOptions::default()
                },
            }
        );
        assert_eq!(ToolCall::from_function("clearCanvas", "").unwrap(), ToolCall::ClearCanvas);
        assert!(matches!(
            ToolCall::from_function("drawDragon", "{}"),
            Err(WhiteboardError::UnknownToolCall(_))
        ));
        assert!(ToolCall::from_function("addShape", r#"{"shapeType": "line"}"#).is_err());
    }

    #[test]
    fn image_tool_call_defers_to_caller() {
        let mut board = Whiteboard::default();
        let call = ToolCall::AddImage {
            prompt: "a volcano".to_string(),
            options: ImageOptions::default(),
        };
        assert!(matches!(
            board.apply_tool_call(&call),
            ToolOutcome::ImageRequested { .. }
        ));
        assert!(board.objects().is_empty());
    }
}
