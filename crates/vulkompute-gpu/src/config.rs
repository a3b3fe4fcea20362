//! Manager configuration.

use ash::vk;
use std::ffi::CString;

/// Standard Khronos validation layer.
pub const KHRONOS_VALIDATION: &str = "VK_LAYER_KHRONOS_validation";

/// Capacity of the manager's descriptor pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorPoolConfig {
    /// Maximum number of descriptor sets.
    pub max_sets: u32,
    /// Storage-buffer descriptors across all sets.
    pub storage_buffers: u32,
    /// Uniform-buffer descriptors across all sets.
    pub uniform_buffers: u32,
}

impl Default for DescriptorPoolConfig {
    fn default() -> Self {
        Self {
            max_sets: 20,
            storage_buffers: 20,
            uniform_buffers: 10,
        }
    }
}

impl DescriptorPoolConfig {
    /// Pool sizes in the form `vkCreateDescriptorPool` expects.
    pub fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        [
            (vk::DescriptorType::STORAGE_BUFFER, self.storage_buffers),
            (vk::DescriptorType::UNIFORM_BUFFER, self.uniform_buffers),
        ]
        .into_iter()
        .filter(|&(_, count)| count > 0)
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize {
            ty,
            descriptor_count,
        })
        .collect()
    }
}

/// Configuration passed to [`ComputeManager::new`](crate::ComputeManager::new).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Application name reported to the driver.
    pub app_name: String,
    /// Vulkan API version requested at instance creation.
    pub api_version: u32,
    /// Enable validation layers (default: debug builds only).
    pub validation: bool,
    /// Layers enabled when `validation` is set.
    pub validation_layers: Vec<String>,
    /// Enable portability enumeration and `VK_KHR_portability_subset`
    /// (default: macOS only, for MoltenVK).
    pub portability: bool,
    /// Additional instance extensions.
    pub instance_extensions: Vec<String>,
    /// Additional device extensions.
    pub device_extensions: Vec<String>,
    /// Descriptor pool capacity.
    pub descriptor_pool: DescriptorPoolConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            app_name: "vulkompute".to_string(),
            api_version: vk::API_VERSION_1_1,
            validation: cfg!(debug_assertions),
            validation_layers: vec![KHRONOS_VALIDATION.to_string()],
            portability: cfg!(target_os = "macos"),
            instance_extensions: Vec::new(),
            device_extensions: Vec::new(),
            descriptor_pool: DescriptorPoolConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Create a new config with the given application name.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Set the requested API version.
    pub fn with_api_version(mut self, api_version: u32) -> Self {
        self.api_version = api_version;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Replace the validation layer list.
    pub fn with_validation_layers<I, S>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validation_layers = layers.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable the portability extensions.
    pub fn with_portability(mut self, portability: bool) -> Self {
        self.portability = portability;
        self
    }

    /// Request an additional instance extension.
    pub fn with_instance_extension(mut self, name: impl Into<String>) -> Self {
        self.instance_extensions.push(name.into());
        self
    }

    /// Request an additional device extension.
    pub fn with_device_extension(mut self, name: impl Into<String>) -> Self {
        self.device_extensions.push(name.into());
        self
    }

    /// Set the descriptor pool capacity.
    pub fn with_descriptor_pool(mut self, descriptor_pool: DescriptorPoolConfig) -> Self {
        self.descriptor_pool = descriptor_pool;
        self
    }
}

/// Convert configured names to C strings, dropping any with interior NULs.
pub(crate) fn to_c_strings(names: &[String]) -> Vec<CString> {
    names
        .iter()
        .filter_map(|name| match CString::new(name.as_str()) {
            Ok(c) => Some(c),
            Err(_) => {
                tracing::warn!("Ignoring name with interior NUL: {:?}", name);
                None
            }
        })
        .collect()
}
