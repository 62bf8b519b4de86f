//! Shared fixtures: a service bound to an in-memory cluster.
#![allow(dead_code)]

use std::sync::Arc;

use hdfsgate_core::assembler::FS_HDFS_IMPL;
use hdfsgate_core::binder::MEMORY_FILE_SYSTEM;
use hdfsgate_core::fs::memory::MemoryFileSystem;
use hdfsgate_core::{
    BundleMessageSource, ConfigurationAssembler, FileSystemRegistry, FilesystemBinder,
    HdfsConfig, HdfsService, KerberosIdentityService,
};

pub const CLUSTER_URI: &str = "hdfs://NameNodeCluster";

/// Binds through the real binder with `fs.hdfs.impl` pointed at memory.
pub async fn bound_service() -> (Arc<MemoryFileSystem>, HdfsService) {
    let fs = Arc::new(MemoryFileSystem::new(CLUSTER_URI));
    let mut registry = FileSystemRegistry::with_defaults();
    registry.register_memory(fs.clone());

    let config = HdfsConfig {
        hosts: Some("nn-a:8020,nn-b:8020".to_string()),
        ..HdfsConfig::default()
    };
    let mut conf = ConfigurationAssembler::assemble(&config).unwrap();
    conf.set(FS_HDFS_IMPL, MEMORY_FILE_SYSTEM);

    let mut binder = FilesystemBinder::new(registry, Box::new(KerberosIdentityService::new()));
    let handle = binder.bind(&config, &conf).await.unwrap();
    let service = HdfsService::new(Some(handle), Arc::new(BundleMessageSource::builtin()));
    (fs, service)
}

pub async fn write(service: &HdfsService, dir: &str, name: &str, data: &[u8], append: bool) {
    let mut source = data;
    service
        .write_file(&mut source, dir, name, append)
        .await
        .unwrap();
}
