//! Text Input Sources (Carbon TIS) registry
//!
//! Thin bindings over the HIToolbox TIS functions. Every call copies the
//! properties it needs into an `InputSourceDescriptor`; selection looks
//! the source up again by ID.

use std::ffi::c_void;

use core_foundation::array::{CFArray, CFArrayRef};
use core_foundation::base::{CFType, CFTypeRef, TCFType};
use core_foundation::boolean::{CFBoolean, CFBooleanRef};
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::string::{CFString, CFStringRef};
use tracing::debug;

use super::registry::{InputSourceDescriptor, InputSourceRegistry, RegistryError, SourceCategory};

type TISInputSourceRef = *const c_void;
type OSStatus = i32;

#[link(name = "Carbon", kind = "framework")]
extern "C" {
    fn TISCopyCurrentKeyboardInputSource() -> TISInputSourceRef;
    fn TISCreateInputSourceList(properties: CFDictionaryRef, include_all_installed: u8) -> CFArrayRef;
    fn TISGetInputSourceProperty(source: TISInputSourceRef, key: CFStringRef) -> *const c_void;
    fn TISSelectInputSource(source: TISInputSourceRef) -> OSStatus;

    static kTISPropertyInputSourceID: CFStringRef;
    static kTISPropertyLocalizedName: CFStringRef;
    static kTISPropertyInputSourceCategory: CFStringRef;
    static kTISPropertyInputSourceIsEnabled: CFStringRef;
    static kTISPropertyInputSourceIsSelectCapable: CFStringRef;
    static kTISCategoryKeyboardInputSource: CFStringRef;
}

/// The system input source registry
#[derive(Debug, Clone, Copy, Default)]
pub struct TisRegistry;

impl TisRegistry {
    /// Sources matching a single property filter, retained by the array
    fn list(&self, key: CFStringRef, value: CFType) -> Result<CFArray<CFType>, RegistryError> {
        // SAFETY: `key` is a framework constant; the returned array follows
        // the create rule and is released when the wrapper drops.
        unsafe {
            let key = CFString::wrap_under_get_rule(key);
            let filter = CFDictionary::from_CFType_pairs(&[(key, value)]);
            let list = TISCreateInputSourceList(filter.as_concrete_TypeRef(), 0);
            if list.is_null() {
                return Err(RegistryError::ListUnavailable);
            }
            Ok(CFArray::wrap_under_create_rule(list))
        }
    }
}

impl InputSourceRegistry for TisRegistry {
    fn current(&self) -> Result<InputSourceDescriptor, RegistryError> {
        // SAFETY: the copied source follows the create rule and is released
        // by the CFType wrapper.
        unsafe {
            let source = TISCopyCurrentKeyboardInputSource();
            if source.is_null() {
                return Err(RegistryError::NoCurrentSource);
            }
            let source = CFType::wrap_under_create_rule(source as CFTypeRef);
            describe(source.as_CFTypeRef()).ok_or(RegistryError::NoCurrentSource)
        }
    }

    fn enabled_sources(&self) -> Result<Vec<InputSourceDescriptor>, RegistryError> {
        // SAFETY: framework constant
        let key = unsafe { kTISPropertyInputSourceIsEnabled };
        let list = self.list(key, CFBoolean::true_value().as_CFType())?;

        let sources: Vec<InputSourceDescriptor> = list
            .iter()
            // SAFETY: every element of the list is a live TISInputSourceRef
            .filter_map(|item| unsafe { describe(item.as_CFTypeRef()) })
            .collect();
        debug!(count = sources.len(), "enabled input sources listed");
        Ok(sources)
    }

    fn select(&self, target: &InputSourceDescriptor) -> Result<(), RegistryError> {
        // SAFETY: framework constant
        let key = unsafe { kTISPropertyInputSourceID };
        let list = self.list(key, CFString::new(&target.id).as_CFType())?;
        let source = list
            .iter()
            .next()
            .ok_or_else(|| RegistryError::NotFound(target.id.clone()))?;

        // SAFETY: `source` is kept alive by `list` for the duration of the call
        let status = unsafe { TISSelectInputSource(source.as_CFTypeRef()) };
        if status == 0 {
            Ok(())
        } else {
            Err(RegistryError::Select {
                id: target.id.clone(),
                status,
            })
        }
    }
}

/// Copy the properties of a TIS input source
///
/// # Safety
///
/// `source` must be a valid `TISInputSourceRef`.
unsafe fn describe(source: TISInputSourceRef) -> Option<InputSourceDescriptor> {
    let id = string_property(source, kTISPropertyInputSourceID)?;
    let display_name = string_property(source, kTISPropertyLocalizedName).unwrap_or_default();
    let keyboard = CFString::wrap_under_get_rule(kTISCategoryKeyboardInputSource).to_string();
    let category = match string_property(source, kTISPropertyInputSourceCategory) {
        Some(category) if category == keyboard => SourceCategory::Keyboard,
        _ => SourceCategory::Other,
    };

    Some(InputSourceDescriptor {
        id,
        display_name,
        category,
        is_enabled: bool_property(source, kTISPropertyInputSourceIsEnabled),
        is_selectable: bool_property(source, kTISPropertyInputSourceIsSelectCapable),
    })
}

/// Property values follow the get rule: not owned by the caller
unsafe fn string_property(source: TISInputSourceRef, key: CFStringRef) -> Option<String> {
    let value = TISGetInputSourceProperty(source, key);
    if value.is_null() {
        return None;
    }
    Some(CFString::wrap_under_get_rule(value as CFStringRef).to_string())
}

unsafe fn bool_property(source: TISInputSourceRef, key: CFStringRef) -> bool {
    let value = TISGetInputSourceProperty(source, key);
    if value.is_null() {
        return false;
    }
    CFBoolean::wrap_under_get_rule(value as CFBooleanRef).into()
}
