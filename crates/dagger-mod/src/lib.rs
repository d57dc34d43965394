pub mod codec;
pub mod core;
pub mod dispatch;
pub mod errors;
pub mod logging;
pub mod module;
pub mod register;
pub mod registry;
pub mod typedef;
pub mod value;

pub use crate::core::config::{Config, ConfigBuilder};
pub use crate::core::logger::{DynLogger, Logger};
pub use crate::dispatch::{Dispatcher, InvocationRequest, InvocationResponse};
pub use crate::errors::{DispatchError, ModError, RegisterError};
pub use crate::module::Module;
pub use crate::registry::{Call, FunctionError, Handler, Resolvers};
pub use crate::value::{EnumValue, ObjectRef, ObjectValue, Value};
