// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod config;
pub mod frame;
pub mod input;
pub mod model;
pub mod output;
pub mod session;
pub mod task;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 解析命令行中的地址：带方案的 URL 原样解析，裸路径按 `scheme` 补全为文件 URL。
pub fn parse_url_or_path(value: &str, scheme: &str) -> Result<url::Url, url::ParseError> {
  match url::Url::parse(value) {
    Ok(url) if url.scheme().len() > 1 => Ok(url),
    _ => {
      let path = std::path::Path::new(value);
      let absolute = if path.is_absolute() {
        path.to_path_buf()
      } else {
        std::env::current_dir()
          .map(|cwd| cwd.join(path))
          .unwrap_or_else(|_| path.to_path_buf())
      };
      // 逐段编码，避免路径中的 `#`、`?` 被当作片段或查询
      let encoded = absolute
        .to_string_lossy()
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
      url::Url::parse(&format!("{}://{}", scheme, encoded))
    }
  }
}

/// 取出 URL 中的文件路径，并还原百分号编码。
pub fn url_file_path(url: &url::Url) -> std::path::PathBuf {
  let raw = url.path();
  match urlencoding::decode(raw) {
    Ok(decoded) => std::path::PathBuf::from(decoded.into_owned()),
    Err(_) => std::path::PathBuf::from(raw),
  }
}
