//! # Renderer and Viewer Settings
//!
//! Every section derives serde with `#[serde(default)]`, so a config file only
//! needs the keys it overrides:
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [camera]
//! move_speed = 4.0
//! ```

use serde::{Serialize, Deserialize};

use super::{Config, ConfigError};

/// Window creation parameters handed to the windowing collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "glTF Viewer".to_string(),
            width: 800,
            height: 800,
        }
    }
}

/// # Shader Configuration
///
/// Paths to the precompiled SPIR-V modules used by the scene pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Validate that both paths are set
    pub fn validate(&self) -> Result<(), String> {
        if self.vertex_shader_path.is_empty() {
            return Err("Vertex shader path cannot be empty".to_string());
        }
        if self.fragment_shader_path.is_empty() {
            return Err("Fragment shader path cannot be empty".to_string());
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::new("shaders/spv/vertshader.spv", "shaders/spv/fragshader.spv")
    }
}

/// # Vulkan Renderer Configuration
///
/// Configuration specific to the Vulkan backend: instance metadata, frame
/// pacing and debug features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulkanRendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Frames-in-flight budget
    pub max_frames_in_flight: usize,
    /// Whether to enable Vulkan validation layers (`None` = debug builds only)
    pub enable_validation: Option<bool>,
    /// Clear color of the scene pass (linear RGBA)
    pub clear_color: [f32; 4],
    /// Combined image samplers reserved in the shared pool for the overlay
    pub overlay_sampler_reserve: u32,
}

impl VulkanRendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            shaders: ShaderConfig::default(),
            max_frames_in_flight: 2,
            enable_validation: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            overlay_sampler_reserve: 8,
        }
    }

    /// Set custom shader configuration
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set maximum frames in flight
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Resolve the validation setting against the build type
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }

        if self.max_frames_in_flight == 0 {
            return Err("Max frames in flight must be at least 1".to_string());
        }

        if self.max_frames_in_flight > 8 {
            return Err("Max frames in flight should not exceed 8".to_string());
        }

        self.shaders.validate()?;

        Ok(())
    }
}

impl Default for VulkanRendererConfig {
    fn default() -> Self {
        Self::new("glTF Viewer")
    }
}

/// Which asset to load at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Path to the `.gltf` / `.glb` file
    pub asset_path: String,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            asset_path: "assets/scene.gltf".to_string(),
        }
    }
}

/// Free-fly camera tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Translation speed in units per second
    pub move_speed: f32,
    /// Degrees of rotation per pixel of mouse drag
    pub rotation_speed: f32,
    /// Units moved per wheel notch
    pub wheel_speed_scale: f32,
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
    /// Starting position
    pub start_position: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            move_speed: 2.0,
            rotation_speed: 0.1,
            wheel_speed_scale: 0.3,
            fov_degrees: 45.0,
            near: 0.1,
            far: 100.0,
            start_position: [0.0, 0.0, 3.0],
        }
    }
}

impl CameraConfig {
    /// Validate clip planes and field of view
    pub fn validate(&self) -> Result<(), String> {
        if self.near <= 0.0 {
            return Err(format!("Near plane must be positive, got {}", self.near));
        }
        if self.far <= self.near {
            return Err(format!("Far plane ({}) must lie beyond near plane ({})", self.far, self.near));
        }
        if !(1.0..180.0).contains(&self.fov_degrees) {
            return Err(format!("Field of view must be in [1, 180) degrees, got {}", self.fov_degrees));
        }
        Ok(())
    }
}

/// # Engine Configuration
///
/// Process-wide behavior that is not tied to a subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration the viewer loads at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Window parameters
    pub window: WindowConfig,
    /// Rendering system configuration
    pub renderer: VulkanRendererConfig,
    /// Startup asset
    pub scene: SceneConfig,
    /// Camera tuning
    pub camera: CameraConfig,
}

impl ApplicationConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.scene.asset_path.is_empty() {
            return Err(ConfigError::Invalid("Scene asset path cannot be empty".to_string()));
        }
        self.renderer.validate().map_err(ConfigError::Invalid)?;
        self.camera.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

impl Config for ApplicationConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_viewer_settings() {
        let config = ApplicationConfig::default();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 800);
        assert_eq!(config.renderer.max_frames_in_flight, 2);
        assert_eq!(config.renderer.shaders.vertex_shader_path, "shaders/spv/vertshader.spv");
        assert_eq!(config.camera.move_speed, 2.0);
        assert_eq!(config.camera.rotation_speed, 0.1);
        assert_eq!(config.camera.wheel_speed_scale, 0.3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ApplicationConfig = toml::from_str(
            "[window]\nwidth = 1280\n\n[renderer]\nmax_frames_in_flight = 3\n",
        )
        .unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 800);
        assert_eq!(config.renderer.max_frames_in_flight, 3);
        assert_eq!(config.scene, SceneConfig::default());
    }

    #[test]
    fn test_ron_section_parses() {
        let camera: CameraConfig = ron::from_str("(move_speed: 5.0, near: 0.5)").unwrap();
        assert_eq!(camera.move_speed, 5.0);
        assert_eq!(camera.near, 0.5);
        assert_eq!(camera.far, 100.0);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ApplicationConfig::default();
        config.renderer.max_frames_in_flight = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ApplicationConfig::default();
        config.window.height = 0;
        assert!(config.validate().is_err());

        let mut config = ApplicationConfig::default();
        config.camera.far = config.camera.near;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unsupported_extension_is_reported() {
        let result = ApplicationConfig::load_from_file("Cargo.lock.json");
        // Missing file surfaces as Io before the extension is checked
        assert!(matches!(result, Err(ConfigError::Io(_))));

        let err = ApplicationConfig::default().save_to_file("viewer.json").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }
}
