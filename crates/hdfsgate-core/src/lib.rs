#![warn(missing_docs)]

//! hdfsgate core: cluster configuration assembly, filesystem binding, localized
//! messages and the HDFS path/file/xattr operation surface

pub mod assembler;
pub mod binder;
pub mod config;
pub mod configuration;
pub mod error;
pub mod fs;
pub mod identity;
pub mod messages;
pub mod operations;

pub use assembler::ConfigurationAssembler;
pub use binder::{BinderState, FileSystemRegistry, FilesystemBinder, Handle};
pub use config::{ConfigMode, HadoopConfig, HdfsConfig};
pub use configuration::Configuration;
pub use error::{HdfsError, Result};
pub use fs::{ClusterFileSystem, FileStatus};
pub use identity::{AuthMethod, IdentityService, KerberosIdentityService, UserContext};
pub use messages::{BundleMessageSource, Locale, MessageSource};
pub use operations::{DirectoryListing, HandleInfo, HdfsService};
