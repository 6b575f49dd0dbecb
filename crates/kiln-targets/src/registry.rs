//! The closed table of supported targets.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::Serialize;

use crate::descriptor::{BackendFamily, TargetDescriptor};
use crate::error::{Result, TargetError};
use crate::flags::TargetFlags;
use crate::probe::CapabilityProbe;
use crate::resolve::NATIVE;

/// One supported target: canonical name plus flag composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetEntry {
    pub name: &'static str,
    #[serde(serialize_with = "serialize_flags")]
    pub flags: TargetFlags,
    pub description: &'static str,
}

fn serialize_flags<S>(flags: &TargetFlags, s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.collect_seq(flags.iter_names().map(|(name, _)| name))
}

impl TargetEntry {
    pub const fn new(name: &'static str, flags: TargetFlags, description: &'static str) -> Self {
        Self {
            name,
            flags,
            description,
        }
    }

    pub fn descriptor(&self) -> TargetDescriptor {
        TargetDescriptor::from_flags(self.flags)
    }

    pub fn family(&self) -> BackendFamily {
        self.descriptor().family()
    }
}

const X86: TargetFlags = TargetFlags::ARCH_X86;
const X64: TargetFlags = X86.union(TargetFlags::X86_64BIT);
const SSE41: TargetFlags = TargetFlags::X86_SSE41;
const AVX: TargetFlags = TargetFlags::X86_SSE41.union(TargetFlags::X86_AVX);
const NACL: TargetFlags = TargetFlags::X86_NACL;
const ARM: TargetFlags = TargetFlags::ARCH_ARM;
const GPU_HOST: TargetFlags = X64.union(SSE41);

/// Every supported target, in listing order.
pub const BUILTIN_TARGETS: [TargetEntry; 17] = [
    TargetEntry::new("x86-32", X86, "32-bit x86, SSE2 baseline"),
    TargetEntry::new("x86-32-sse41", X86.union(SSE41), "32-bit x86 with SSE4.1"),
    TargetEntry::new("x86-64", X64, "64-bit x86, SSE2 baseline"),
    TargetEntry::new("x86-64-sse41", X64.union(SSE41), "64-bit x86 with SSE4.1"),
    TargetEntry::new("x86-64-avx", X64.union(AVX), "64-bit x86 with AVX"),
    TargetEntry::new("x86-32-nacl", X86.union(NACL), "32-bit x86 under Native Client"),
    TargetEntry::new(
        "x86-32-sse41-nacl",
        X86.union(SSE41).union(NACL),
        "32-bit x86 with SSE4.1 under Native Client",
    ),
    TargetEntry::new("x86-64-nacl", X64.union(NACL), "64-bit x86 under Native Client"),
    TargetEntry::new(
        "x86-64-sse41-nacl",
        X64.union(SSE41).union(NACL),
        "64-bit x86 with SSE4.1 under Native Client",
    ),
    TargetEntry::new(
        "x86-64-avx-nacl",
        X64.union(AVX).union(NACL),
        "64-bit x86 with AVX under Native Client",
    ),
    TargetEntry::new("arm", ARM, "32-bit ARM, Linux EABI"),
    TargetEntry::new("arm-android", ARM.union(TargetFlags::ARM_ANDROID), "32-bit ARM, Android"),
    TargetEntry::new("arm-ios", ARM.union(TargetFlags::ARM_IOS), "32-bit ARM, iOS"),
    TargetEntry::new(
        "arm-nacl",
        ARM.union(TargetFlags::ARM_NACL),
        "32-bit ARM under Native Client",
    ),
    TargetEntry::new(
        "ptx",
        GPU_HOST.union(TargetFlags::GPU_PTX),
        "x86-64 host with PTX device code",
    ),
    TargetEntry::new(
        "ptx-debug",
        GPU_HOST.union(TargetFlags::GPU_PTX).union(TargetFlags::GPU_DEBUG),
        "x86-64 host with instrumented PTX device code",
    ),
    TargetEntry::new(
        "opencl",
        GPU_HOST.union(TargetFlags::GPU_OPENCL),
        "x86-64 host with OpenCL device code",
    ),
];

/// Ordered, name-indexed set of targets with unique names and flag sets.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    entries: Vec<TargetEntry>,
    index: BTreeMap<&'static str, usize>,
}

impl TargetRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target. Fails if the name or the flag set is already taken, or
    /// the flags are not a valid composition.
    pub fn register(&mut self, entry: TargetEntry) -> Result<()> {
        let invalid = |detail: String| TargetError::InvalidEntry {
            name: entry.name.to_string(),
            detail,
        };

        if entry.name.is_empty() || entry.name == NATIVE {
            return Err(invalid("reserved target name".into()));
        }
        if self.index.contains_key(entry.name) {
            return Err(invalid("duplicate target name".into()));
        }
        if let Some(existing) = self.find_by_flags(entry.flags) {
            return Err(invalid(format!("same flags as '{}'", existing.name)));
        }
        if let Some(issue) = entry.flags.composition_issue() {
            return Err(invalid(issue));
        }

        self.index.insert(entry.name, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn from_entries(entries: impl IntoIterator<Item = TargetEntry>) -> Result<Self> {
        let mut registry = Self::new();
        for entry in entries {
            registry.register(entry)?;
        }
        Ok(registry)
    }

    /// The built-in table, validated on first use.
    pub fn builtin() -> &'static TargetRegistry {
        static BUILTIN: OnceLock<TargetRegistry> = OnceLock::new();
        BUILTIN.get_or_init(|| match Self::from_entries(BUILTIN_TARGETS) {
            Ok(registry) => registry,
            Err(e) => panic!("built-in target table is inconsistent: {e}"),
        })
    }

    /// Exact-match lookup.
    pub fn lookup(&self, name: &str) -> Option<&TargetEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn find_by_flags(&self, flags: TargetFlags) -> Option<&TargetEntry> {
        self.entries.iter().find(|e| e.flags == flags)
    }

    pub fn entries(&self) -> &[TargetEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name)
    }

    /// Every accepted identifier, ending with `native`.
    pub fn supported_names(&self) -> Vec<&'static str> {
        self.names().chain(std::iter::once(NATIVE)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an already-resolved string, building the full diagnostic on a
    /// miss. The probe is only asked for the native identifier when the
    /// lookup fails.
    pub fn bind(&self, resolved: &str, probe: &dyn CapabilityProbe) -> Result<&TargetEntry> {
        if let Some(entry) = self.lookup(resolved) {
            tracing::debug!(name = entry.name, flags = ?entry.flags, "bound target entry");
            return Ok(entry);
        }
        let native = match probe.native_target() {
            Ok(native) => native.to_string(),
            Err(e) => format!("unsupported hardware ({e})"),
        };
        Err(TargetError::UnknownTarget {
            requested: resolved.to_string(),
            native,
            supported: self.supported_names(),
        })
    }
}
