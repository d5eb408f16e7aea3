//! Exception classification, envelope field resolution and notification

mod exception;
mod mapping;
mod notifier;
mod resolve;

pub use exception::{AsAny, Exception, ExceptionType, Foreign, Raised};
pub use mapping::{Classification, Converter, ErrorMappingTable, MappingTarget};
pub use notifier::{
    DispatchContext, NotificationService, NotificationServices, Notifier, NotifierCallback,
    NotifierName, RequestData,
};
pub use resolve::{ErrorFields, ErrorResolver};
