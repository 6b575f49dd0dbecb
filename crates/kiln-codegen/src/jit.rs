//! Handles to JIT-compiled code.
//!
//! Every compiled function `f` comes with a uniform entry point
//! `f_argv(void **args, void *result)`. `args[i]` points at the value of
//! scalar argument `i`, or is the data pointer itself for buffer arguments.
//! `result` receives the return value, if any.

use std::ffi::c_void;
use std::fmt;

use kiln_ir::{Argument, Type};

use crate::error::{CodegenError, Result};
use crate::machine::DeviceInfo;

/// A typed scalar crossing the JIT boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl ScalarValue {
    pub fn ty(&self) -> Type {
        match self {
            ScalarValue::Bool(_) => Type::bool(),
            ScalarValue::I8(_) => Type::i8(),
            ScalarValue::I16(_) => Type::i16(),
            ScalarValue::I32(_) => Type::i32(),
            ScalarValue::I64(_) => Type::i64(),
            ScalarValue::U8(_) => Type::u8(),
            ScalarValue::U16(_) => Type::u16(),
            ScalarValue::U32(_) => Type::u32(),
            ScalarValue::U64(_) => Type::u64(),
            ScalarValue::F32(_) => Type::f32(),
            ScalarValue::F64(_) => Type::f64(),
        }
    }

    /// Parse `text` as a value of type `ty`.
    pub fn parse(ty: Type, text: &str) -> std::result::Result<Self, String> {
        fn num<T: std::str::FromStr>(ty: Type, text: &str) -> std::result::Result<T, String> {
            text.trim()
                .parse()
                .map_err(|_| format!("cannot parse '{text}' as {ty}"))
        }

        Ok(match ty {
            Type::Bool => match text.trim() {
                "true" | "1" => ScalarValue::Bool(true),
                "false" | "0" => ScalarValue::Bool(false),
                _ => return Err(format!("cannot parse '{text}' as bool")),
            },
            Type::Int { bits: 8 } => ScalarValue::I8(num(ty, text)?),
            Type::Int { bits: 16 } => ScalarValue::I16(num(ty, text)?),
            Type::Int { bits: 32 } => ScalarValue::I32(num(ty, text)?),
            Type::Int { bits: 64 } => ScalarValue::I64(num(ty, text)?),
            Type::UInt { bits: 8 } => ScalarValue::U8(num(ty, text)?),
            Type::UInt { bits: 16 } => ScalarValue::U16(num(ty, text)?),
            Type::UInt { bits: 32 } => ScalarValue::U32(num(ty, text)?),
            Type::UInt { bits: 64 } => ScalarValue::U64(num(ty, text)?),
            Type::Float { bits: 32 } => ScalarValue::F32(num(ty, text)?),
            Type::Float { bits: 64 } => ScalarValue::F64(num(ty, text)?),
            other => return Err(format!("{other} values cannot cross the JIT boundary")),
        })
    }

    /// In-memory buffer element representation.
    pub fn to_ne_bytes(&self) -> Vec<u8> {
        let mut slot = [0u8; 8];
        self.write_to(&mut slot);
        slot[..self.ty().bytes()].to_vec()
    }

    /// Decode one buffer element of type `ty`.
    pub fn from_ne_bytes(ty: Type, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ty.bytes() || ty.bytes() > 8 {
            return None;
        }
        let mut slot = [0u8; 8];
        slot[..bytes.len()].copy_from_slice(bytes);
        Self::read_from(ty, &slot)
    }

    fn write_to(&self, slot: &mut [u8; 8]) {
        fn put<const N: usize>(slot: &mut [u8; 8], bytes: [u8; N]) {
            slot[..N].copy_from_slice(&bytes);
        }

        match *self {
            ScalarValue::Bool(v) => put(slot, [u8::from(v)]),
            ScalarValue::I8(v) => put(slot, v.to_ne_bytes()),
            ScalarValue::I16(v) => put(slot, v.to_ne_bytes()),
            ScalarValue::I32(v) => put(slot, v.to_ne_bytes()),
            ScalarValue::I64(v) => put(slot, v.to_ne_bytes()),
            ScalarValue::U8(v) => put(slot, v.to_ne_bytes()),
            ScalarValue::U16(v) => put(slot, v.to_ne_bytes()),
            ScalarValue::U32(v) => put(slot, v.to_ne_bytes()),
            ScalarValue::U64(v) => put(slot, v.to_ne_bytes()),
            ScalarValue::F32(v) => put(slot, v.to_ne_bytes()),
            ScalarValue::F64(v) => put(slot, v.to_ne_bytes()),
        }
    }

    fn read_from(ty: Type, slot: &[u8; 8]) -> Option<Self> {
        let b2 = [slot[0], slot[1]];
        let b4 = [slot[0], slot[1], slot[2], slot[3]];
        Some(match ty {
            Type::Bool => ScalarValue::Bool(slot[0] & 1 != 0),
            Type::Int { bits: 8 } => ScalarValue::I8(i8::from_ne_bytes([slot[0]])),
            Type::Int { bits: 16 } => ScalarValue::I16(i16::from_ne_bytes(b2)),
            Type::Int { bits: 32 } => ScalarValue::I32(i32::from_ne_bytes(b4)),
            Type::Int { bits: 64 } => ScalarValue::I64(i64::from_ne_bytes(*slot)),
            Type::UInt { bits: 8 } => ScalarValue::U8(slot[0]),
            Type::UInt { bits: 16 } => ScalarValue::U16(u16::from_ne_bytes(b2)),
            Type::UInt { bits: 32 } => ScalarValue::U32(u32::from_ne_bytes(b4)),
            Type::UInt { bits: 64 } => ScalarValue::U64(u64::from_ne_bytes(*slot)),
            Type::Float { bits: 32 } => ScalarValue::F32(f32::from_ne_bytes(b4)),
            Type::Float { bits: 64 } => ScalarValue::F64(f64::from_ne_bytes(*slot)),
            _ => return None,
        })
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::I8(v) => write!(f, "{v}"),
            ScalarValue::I16(v) => write!(f, "{v}"),
            ScalarValue::I32(v) => write!(f, "{v}"),
            ScalarValue::I64(v) => write!(f, "{v}"),
            ScalarValue::U8(v) => write!(f, "{v}"),
            ScalarValue::U16(v) => write!(f, "{v}"),
            ScalarValue::U32(v) => write!(f, "{v}"),
            ScalarValue::U64(v) => write!(f, "{v}"),
            ScalarValue::F32(v) => write!(f, "{v}"),
            ScalarValue::F64(v) => write!(f, "{v}"),
        }
    }
}

/// One actual argument for [`JitModule::call`].
#[derive(Debug)]
pub enum ArgValue<'a> {
    Scalar(ScalarValue),
    /// Raw element storage of a buffer argument.
    Buffer(&'a mut [u8]),
}

/// Anything kept alive for as long as the generated code may run.
trait CodeOwner {}

impl<T> CodeOwner for T {}

/// Callable entry points of a JIT-compiled function plus backend metadata.
///
/// Dropping the module releases the generated code.
pub struct JitModule<'ctx> {
    name: String,
    arguments: Vec<Argument>,
    return_type: Option<Type>,
    function: usize,
    argv_function: usize,
    device: Option<DeviceInfo>,
    _owner: Box<dyn CodeOwner + 'ctx>,
}

/// `void f_argv(void **args, void *result)`
pub type ArgvFn = unsafe extern "C" fn(*const *mut c_void, *mut c_void);

impl<'ctx> JitModule<'ctx> {
    /// Wrap generated code.
    ///
    /// # Safety
    ///
    /// `argv_function` must be the address of a function with the [`ArgvFn`]
    /// ABI implementing the argument and return conventions above for
    /// `arguments` and `return_type`, and `owner` must keep both code
    /// addresses valid until it is dropped.
    pub unsafe fn new(
        name: impl Into<String>,
        arguments: Vec<Argument>,
        return_type: Option<Type>,
        function: usize,
        argv_function: usize,
        device: Option<DeviceInfo>,
        owner: impl Sized + 'ctx,
    ) -> Self {
        Self {
            name: name.into(),
            arguments,
            return_type,
            function,
            argv_function,
            device,
            _owner: Box::new(owner),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn return_type(&self) -> Option<Type> {
        self.return_type
    }

    /// Address of the function with its natural signature.
    pub fn function_address(&self) -> usize {
        self.function
    }

    /// Address of the `_argv` entry point.
    pub fn argv_address(&self) -> usize {
        self.argv_function
    }

    /// Device side metadata for GPU-host targets.
    pub fn device(&self) -> Option<DeviceInfo> {
        self.device
    }

    fn invalid(&self, message: String) -> CodegenError {
        CodegenError::InvalidCall {
            function: self.name.clone(),
            message,
        }
    }

    /// Whether values of `ty` can be passed to or returned from [`call`].
    ///
    /// [`call`]: JitModule::call
    pub fn crosses_boundary(ty: Type) -> bool {
        ScalarValue::read_from(ty, &[0u8; 8]).is_some()
    }

    /// Call the function through its `_argv` entry point.
    ///
    /// Arguments are checked against the declared signature.
    ///
    /// # Safety
    ///
    /// Generated code reads and writes buffer elements without bounds
    /// checks. Every index the function loads from or stores to must lie
    /// within the corresponding [`ArgValue::Buffer`] for the argument values
    /// given.
    pub unsafe fn call(&self, args: &mut [ArgValue<'_>]) -> Result<Option<ScalarValue>> {
        if let Some(ty) = self.return_type.filter(|ty| !Self::crosses_boundary(*ty)) {
            return Err(self.invalid(format!("{ty} results cannot cross the JIT boundary")));
        }
        if args.len() != self.arguments.len() {
            return Err(self.invalid(format!(
                "expected {} arguments, got {}",
                self.arguments.len(),
                args.len()
            )));
        }

        let mut slots = vec![[0u8; 8]; args.len()];
        let mut pointers: Vec<*mut c_void> = Vec::with_capacity(args.len());
        for (i, (formal, actual)) in self.arguments.iter().zip(args.iter_mut()).enumerate() {
            match actual {
                ArgValue::Scalar(value) if !formal.is_buffer => {
                    if value.ty() != formal.ty {
                        return Err(self.invalid(format!(
                            "argument '{}' expects {}, got {}",
                            formal.name,
                            formal.ty,
                            value.ty()
                        )));
                    }
                    value.write_to(&mut slots[i]);
                }
                ArgValue::Buffer(data) if formal.is_buffer => {
                    if data.len() % formal.ty.bytes() != 0 {
                        return Err(self.invalid(format!(
                            "buffer '{}' length {} is not a multiple of {} bytes",
                            formal.name,
                            data.len(),
                            formal.ty.bytes()
                        )));
                    }
                }
                _ => {
                    let expected = if formal.is_buffer { "a buffer" } else { "a scalar" };
                    return Err(self.invalid(format!(
                        "argument '{}' expects {expected}",
                        formal.name
                    )));
                }
            }
        }
        for (slot, actual) in slots.iter_mut().zip(args.iter_mut()) {
            let ptr = match actual {
                ArgValue::Scalar(_) => slot.as_mut_ptr().cast::<c_void>(),
                ArgValue::Buffer(data) => data.as_mut_ptr().cast::<c_void>(),
            };
            pointers.push(ptr);
        }

        let mut result = [0u8; 8];
        // SAFETY: the entry point ABI is guaranteed by `JitModule::new`,
        // buffer indices by the caller, and every pointer refers to storage
        // that outlives the call.
        unsafe {
            let entry: ArgvFn = std::mem::transmute::<usize, ArgvFn>(self.argv_function);
            entry(pointers.as_ptr(), result.as_mut_ptr().cast::<c_void>());
        }

        Ok(self
            .return_type
            .and_then(|ty| ScalarValue::read_from(ty, &result)))
    }
}

impl fmt::Debug for JitModule<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JitModule")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .field("return_type", &self.return_type)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Hand-written `_argv` entry point: returns `x + 1` for one int32.
    pub(crate) unsafe extern "C" fn plus_one_argv(args: *const *mut c_void, result: *mut c_void) {
        let x = *(*args).cast::<i32>();
        *result.cast::<i32>() = x + 1;
    }

    /// Writes `value` to every element of an int32 buffer of length `n`.
    unsafe extern "C" fn fill_argv(args: *const *mut c_void, _result: *mut c_void) {
        let out = (*args).cast::<i32>();
        let n = *(*args.add(1)).cast::<i32>();
        let value = *(*args.add(2)).cast::<i32>();
        for i in 0..n as usize {
            *out.add(i) = value;
        }
    }

    pub(crate) fn plus_one_module() -> JitModule<'static> {
        unsafe {
            JitModule::new(
                "plus_one",
                vec![Argument::scalar("x", Type::i32())],
                Some(Type::i32()),
                0,
                plus_one_argv as usize,
                None,
                (),
            )
        }
    }

    #[test]
    fn scalar_call_round_trips_through_argv() {
        let module = plus_one_module();
        let out = unsafe { module.call(&mut [ArgValue::Scalar(ScalarValue::I32(41))]) }.unwrap();
        assert_eq!(out, Some(ScalarValue::I32(42)));
    }

    #[test]
    fn buffer_call_writes_through() {
        let module = unsafe {
            JitModule::new(
                "fill",
                vec![
                    Argument::buffer("out", Type::i32()),
                    Argument::scalar("n", Type::i32()),
                    Argument::scalar("value", Type::i32()),
                ],
                None,
                0,
                fill_argv as usize,
                None,
                (),
            )
        };
        let mut storage = [0u8; 12];
        let out = unsafe {
            module.call(&mut [
                ArgValue::Buffer(&mut storage),
                ArgValue::Scalar(ScalarValue::I32(3)),
                ArgValue::Scalar(ScalarValue::I32(9)),
            ])
        }
        .unwrap();
        assert_eq!(out, None);
        for chunk in storage.chunks(4) {
            assert_eq!(i32::from_ne_bytes(chunk.try_into().unwrap()), 9);
        }
    }

    #[test]
    fn arity_and_type_are_checked() {
        let module = plus_one_module();
        let err = unsafe { module.call(&mut []) }.unwrap_err();
        assert!(err.to_string().contains("expected 1 arguments, got 0"));
        let err = unsafe { module.call(&mut [ArgValue::Scalar(ScalarValue::F32(1.0))]) }
            .unwrap_err();
        assert!(err.to_string().contains("expects int32, got float32"));
        let mut data = [0u8; 4];
        let err = unsafe { module.call(&mut [ArgValue::Buffer(&mut data)]) }.unwrap_err();
        assert!(err.to_string().contains("expects a scalar"));
    }

    /// Must never be reached: the call is rejected before entry.
    unsafe extern "C" fn never_argv(_args: *const *mut c_void, _result: *mut c_void) {
        std::process::abort();
    }

    #[test]
    fn half_precision_results_are_rejected() {
        let module = unsafe {
            JitModule::new(
                "half",
                Vec::new(),
                Some(Type::Float { bits: 16 }),
                0,
                never_argv as usize,
                None,
                (),
            )
        };
        let err = unsafe { module.call(&mut []) }.unwrap_err();
        assert!(err.to_string().contains("float16 results cannot cross the JIT boundary"));
        assert!(!JitModule::crosses_boundary(Type::Float { bits: 16 }));
        assert!(JitModule::crosses_boundary(Type::u64()));
    }

    #[test]
    fn parse_scalars() {
        assert_eq!(ScalarValue::parse(Type::i32(), "7"), Ok(ScalarValue::I32(7)));
        assert_eq!(ScalarValue::parse(Type::u8(), " 255 "), Ok(ScalarValue::U8(255)));
        assert_eq!(ScalarValue::parse(Type::bool(), "true"), Ok(ScalarValue::Bool(true)));
        assert_eq!(ScalarValue::parse(Type::f64(), "2.5"), Ok(ScalarValue::F64(2.5)));
        assert!(ScalarValue::parse(Type::u8(), "256").is_err());
        assert!(ScalarValue::parse(Type::Float { bits: 16 }, "1").is_err());
    }

    #[test]
    fn buffer_elements_use_storage_width() {
        assert_eq!(ScalarValue::U16(0x0102).to_ne_bytes(), 0x0102u16.to_ne_bytes());
        assert_eq!(ScalarValue::Bool(true).to_ne_bytes(), vec![1]);
        assert_eq!(
            ScalarValue::from_ne_bytes(Type::f32(), &1.5f32.to_ne_bytes()),
            Some(ScalarValue::F32(1.5))
        );
        assert_eq!(ScalarValue::from_ne_bytes(Type::i32(), &[0, 0]), None);
    }

    #[test]
    fn slot_encoding_is_native_endian() {
        let mut slot = [0u8; 8];
        ScalarValue::I16(-2).write_to(&mut slot);
        assert_eq!(
            ScalarValue::read_from(Type::i16(), &slot),
            Some(ScalarValue::I16(-2))
        );
        ScalarValue::F64(0.25).write_to(&mut slot);
        assert_eq!(
            ScalarValue::read_from(Type::f64(), &slot),
            Some(ScalarValue::F64(0.25))
        );
    }
}
