//! Vulkan instance creation.

use crate::config::{to_c_strings, ManagerConfig};
use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

/// Owned Vulkan instance.
///
/// Everything created from the instance holds an `Arc<Instance>`, so the
/// instance is destroyed last.
pub struct Instance {
    // Entry must be kept alive for the lifetime of the instance
    entry: ash::Entry,
    raw: ash::Instance,
    enabled_layers: Vec<CString>,
}

impl Instance {
    /// Load the Vulkan loader and create an instance as described by `config`.
    pub fn new(config: &ManagerConfig) -> Result<Arc<Self>> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::InstanceCreation(format!("Failed to load Vulkan: {e}")))?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            match available_extensions(&entry) {
                Ok(names) => tracing::debug!("Available instance extensions: {}", names.join(", ")),
                Err(e) => tracing::debug!("Could not enumerate instance extensions: {e}"),
            }
        }

        let app_name = CString::new(config.app_name.as_str())
            .map_err(|e| GpuError::InstanceCreation(format!("Invalid application name: {e}")))?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"vulkompute")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(config.api_version);

        let enabled_layers = if config.validation {
            unsafe { supported_layers(&entry, to_c_strings(&config.validation_layers))? }
        } else {
            Vec::new()
        };
        let layer_names: Vec<*const c_char> = enabled_layers.iter().map(|l| l.as_ptr()).collect();

        let mut extensions = to_c_strings(&config.instance_extensions);
        let mut create_flags = vk::InstanceCreateFlags::empty();
        if config.portability {
            // Required for MoltenVK
            tracing::info!("Enabling {:?}", ash::khr::portability_enumeration::NAME);
            extensions.push(ash::khr::portability_enumeration::NAME.to_owned());
            create_flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }
        let extension_names: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&extension_names)
            .flags(create_flags);

        let raw = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
            GpuError::InstanceCreation(format!("vkCreateInstance: {e} (VkResult {})", e.as_raw()))
        })?;

        tracing::info!(
            "Created Vulkan instance (validation layers: {})",
            enabled_layers.len()
        );

        Ok(Arc::new(Self {
            entry,
            raw,
            enabled_layers,
        }))
    }

    /// Get the loader entry points.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the raw instance.
    pub fn raw(&self) -> &ash::Instance {
        &self.raw
    }

    /// Whether any validation layer was enabled.
    pub fn validation_enabled(&self) -> bool {
        !self.enabled_layers.is_empty()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            self.raw.destroy_instance(None);
        }
    }
}

/// List the instance extensions the loader reports.
pub fn available_extensions(entry: &ash::Entry) -> Result<Vec<String>> {
    let properties = unsafe { entry.enumerate_instance_extension_properties(None)? };
    Ok(properties
        .iter()
        .map(|p| unsafe { CStr::from_ptr(p.extension_name.as_ptr()) })
        .map(|name| name.to_string_lossy().into_owned())
        .collect())
}

/// Keep only the requested layers the loader actually provides.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
unsafe fn supported_layers(entry: &ash::Entry, requested: Vec<CString>) -> Result<Vec<CString>> {
    let available = entry.enumerate_instance_layer_properties()?;

    Ok(requested
        .into_iter()
        .filter(|layer| {
            let found = available
                .iter()
                .any(|props| CStr::from_ptr(props.layer_name.as_ptr()) == layer.as_c_str());
            if !found {
                tracing::warn!("Validation layer {:?} not available", layer);
            }
            found
        })
        .collect())
}
