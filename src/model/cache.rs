// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/model/cache.rs - 模型缓存
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{error, info};

use crate::model::Model;

/// 已加载模型的共享句柄，加载后只读
pub type ModelHandle<M> = Arc<M>;

/// 会话持有的模型槽位：加载成功的句柄，或启动时的加载错误
pub type ModelSlot<M> = Result<ModelHandle<M>, ModelLoadError>;

#[derive(Error, Debug, Clone)]
#[error("模型加载失败: {message}")]
pub struct ModelLoadError {
  pub message: String,
}

impl ModelLoadError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

/// 模型加载器。重复调用 `load` 不应产生副作用。
pub trait ModelLoader {
  type Model: Model;
  type Error: std::error::Error;

  fn load(&self) -> Result<Self::Model, Self::Error>;

  fn describe(&self) -> String;
}

/// 进程级模型缓存：首次 `get` 时加载，此后复用同一结果。
///
/// 加载失败同样会被缓存，错误只在首次加载时记录一次；
/// 只有显式调用 `invalidate` 之后才会重新加载。
pub struct ModelCache<L: ModelLoader> {
  loader: L,
  slot: Mutex<Option<ModelSlot<L::Model>>>,
}

impl<L: ModelLoader> ModelCache<L> {
  pub fn new(loader: L) -> Self {
    Self {
      loader,
      slot: Mutex::new(None),
    }
  }

  pub fn get(&self) -> ModelSlot<L::Model> {
    let mut slot = self
      .slot
      .lock()
      .map_err(|_| ModelLoadError::new("模型缓存锁已损坏"))?;

    if let Some(cached) = slot.as_ref() {
      return cached.clone();
    }

    info!("加载模型: {}", self.loader.describe());
    let loaded = match self.loader.load() {
      Ok(model) => {
        info!("模型加载完成");
        Ok(Arc::new(model))
      }
      Err(e) => {
        error!("模型加载失败: {}", e);
        Err(ModelLoadError::new(format!(
          "加载模型 '{}' 时出错：{}",
          self.loader.describe(),
          e
        )))
      }
    };
    *slot = Some(loaded.clone());
    loaded
  }

  pub fn invalidate(&self) {
    if let Ok(mut slot) = self.slot.lock() {
      info!("模型缓存已失效: {}", self.loader.describe());
      *slot = None;
    }
  }
}
