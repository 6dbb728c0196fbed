//! 发布数据集
//!
//! `Publisher` 在后台线程上传文件，通过 `PublishHandle` 观察进度并等待结果。
//! 内置的 `DirectoryPublisher` 把数据集写到本地仓库目录 `<root>/<repo_name>/`；
//! 远程仓库实现同一个 trait 即可接入。

use super::DatasetFile;
use super::archive::write_to_dir;
use crate::error::DatasetError;
use crossbeam_channel::{Receiver, unbounded};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, warn};

/// 发布凭据
#[derive(Clone, Default)]
pub struct Credentials {
    pub token: Option<String>,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }
}

// 不打印令牌
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// 上传进度
#[derive(Debug, Clone, PartialEq)]
pub struct PublishProgress {
    pub path: String,
    pub files_done: usize,
    pub files_total: usize,
    pub bytes_done: u64,
    pub bytes_total: u64,
}

/// 发布结果
#[derive(Debug, Clone, PartialEq)]
pub struct PublishSummary {
    pub repo_name: String,
    pub location: String,
    pub files: usize,
    pub bytes: u64,
}

type ProgressCallback = Arc<dyn Fn(&PublishProgress) + Send + Sync>;

/// 进行中的发布
///
/// 进度回调在调用 `wait` 的线程中按顺序执行。
pub struct PublishHandle {
    progress: Receiver<PublishProgress>,
    callbacks: Vec<ProgressCallback>,
    worker: Option<JoinHandle<Result<PublishSummary, DatasetError>>>,
}

impl PublishHandle {
    /// 由发布器创建：`spawn` 在后台线程执行上传，并通过 `report` 报告进度
    pub fn spawn<F>(name: &str, upload: F) -> Result<Self, DatasetError>
    where
        F: FnOnce(&dyn Fn(PublishProgress)) -> Result<PublishSummary, DatasetError>
            + Send
            + 'static,
    {
        let (tx, rx) = unbounded();
        let worker = std::thread::Builder::new()
            .name(format!("publish-{name}"))
            .spawn(move || {
                let report = move |p: PublishProgress| {
                    // 句柄已丢弃时忽略进度
                    let _ = tx.send(p);
                };
                upload(&report)
            })?;

        Ok(Self {
            progress: rx,
            callbacks: Vec::new(),
            worker: Some(worker),
        })
    }

    /// 注册进度回调
    pub fn on_progress<F>(&mut self, callback: F)
    where
        F: Fn(&PublishProgress) + Send + Sync + 'static,
    {
        self.callbacks.push(Arc::new(callback));
    }

    /// 后台任务是否已结束
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(|w| w.is_finished())
    }

    /// 等待发布完成，期间分发进度
    pub fn wait(mut self) -> Result<PublishSummary, DatasetError> {
        // 发送端随工作线程结束而关闭
        for progress in self.progress.iter() {
            for cb in &self.callbacks {
                cb(&progress);
            }
        }

        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| DatasetError::Publish("publish thread panicked".to_string()))?,
            None => Err(DatasetError::Publish("publish already awaited".to_string())),
        }
    }
}

/// 数据集发布器
pub trait Publisher {
    /// 开始发布，立即返回
    fn publish(
        &self,
        files: Vec<DatasetFile>,
        credentials: &Credentials,
        repo_name: &str,
    ) -> Result<PublishHandle, DatasetError>;
}

/// 发布到本地目录
#[derive(Debug, Clone)]
pub struct DirectoryPublisher {
    root: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

fn validate_repo_name(repo_name: &str) -> Result<(), DatasetError> {
    let valid = !repo_name.is_empty()
        && repo_name
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..");
    if valid {
        Ok(())
    } else {
        Err(DatasetError::Publish(format!("invalid repository name: {repo_name:?}")))
    }
}

impl Publisher for DirectoryPublisher {
    fn publish(
        &self,
        files: Vec<DatasetFile>,
        credentials: &Credentials,
        repo_name: &str,
    ) -> Result<PublishHandle, DatasetError> {
        validate_repo_name(repo_name)?;
        if credentials.token.is_none() {
            warn!("Publishing {} without credentials", repo_name);
        }

        let target = self.root.join(repo_name);
        let repo = repo_name.to_string();
        PublishHandle::spawn(repo_name, move |report| {
            let files_total = files.len();
            let bytes_total: u64 = files.iter().map(|f| f.len() as u64).sum();
            let mut bytes_done = 0u64;

            for (i, file) in files.iter().enumerate() {
                write_to_dir(std::slice::from_ref(file), &target)?;
                bytes_done += file.len() as u64;
                report(PublishProgress {
                    path: file.path.clone(),
                    files_done: i + 1,
                    files_total,
                    bytes_done,
                    bytes_total,
                });
            }

            info!("Published {} to {}", repo, target.display());
            Ok(PublishSummary {
                repo_name: repo,
                location: target.display().to_string(),
                files: files_total,
                bytes: bytes_total,
            })
        })
    }
}
