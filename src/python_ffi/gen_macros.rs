/// Wraps an object that a Python method may move out (e.g. `Net.build_trainer`),
/// so later calls on the emptied wrapper raise instead of panicking.
#[macro_export]
macro_rules! MakeConsumable {
    ($name:ident,$inner_type:tt,$obj_name:ident) => {
        pub(super) struct $name {
            obj: Option<$inner_type>,
        }
        #[allow(dead_code)]
        impl $name {
            pub(super) fn acquire(val: $inner_type) -> Self {
                Self { obj: Some(val) }
            }
            fn consumed() -> pyo3::PyErr {
                pyo3::exceptions::PyRuntimeError::new_err(std::stringify!(
                    This $obj_name object is consumed and cannot be used
                ))
            }
            fn get_ref(&self) -> pyo3::PyResult<&$inner_type> {
                self.obj.as_ref().ok_or_else(Self::consumed)
            }
            fn get_ref_mut(&mut self) -> pyo3::PyResult<&mut $inner_type> {
                self.obj.as_mut().ok_or_else(Self::consumed)
            }
            fn release(&mut self) -> pyo3::PyResult<$inner_type> {
                self.obj.take().ok_or_else(Self::consumed)
            }
        }
    };
}

#[macro_export]
macro_rules! Impl_to_PyErr {
    (for $($t:ty),+) => {
        $(impl From<$t> for PyErr {
            fn from(err: $t) -> Self {
                pyo3::exceptions::PyValueError::new_err(format!("{}", err))
            }
        }
        )*
    }
}
