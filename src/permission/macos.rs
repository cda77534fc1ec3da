use core_foundation::base::TCFType;
use core_foundation::boolean::CFBoolean;
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::string::{CFString, CFStringRef};
use tracing::debug;

use super::PermissionProbe;

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXIsProcessTrusted() -> bool;
    fn AXIsProcessTrustedWithOptions(options: CFDictionaryRef) -> bool;

    static kAXTrustedCheckOptionPrompt: CFStringRef;
}

/// Accessibility permission as reported by the AX API
#[derive(Debug, Clone, Copy, Default)]
pub struct AxPermission;

impl PermissionProbe for AxPermission {
    fn is_granted(&self) -> bool {
        // SAFETY: AXIsProcessTrusted only reads the process trust state
        unsafe { AXIsProcessTrusted() }
    }

    fn request(&self) -> bool {
        // SAFETY: kAXTrustedCheckOptionPrompt is a constant CFString owned by
        // the framework; the dictionary retains it for the call's duration.
        let granted = unsafe {
            let key = CFString::wrap_under_get_rule(kAXTrustedCheckOptionPrompt);
            let options = CFDictionary::from_CFType_pairs(&[(key, CFBoolean::true_value())]);
            AXIsProcessTrustedWithOptions(options.as_concrete_TypeRef())
        };
        debug!(granted, "accessibility permission requested");
        granted
    }
}
