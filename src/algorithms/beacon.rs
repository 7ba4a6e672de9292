/// 信标身份、资产定义与资产目录

use std::fmt;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// 信标身份：组织标识 + major + minor
///
/// 作为测距状态的查找键原样使用，不做任何规范化。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BeaconIdentity {
    /// 组织标识（通常为 UUID 字符串）
    pub uuid: String,
    /// 站点分组
    pub major: u16,
    pub minor: u16,
}

impl BeaconIdentity {
    pub fn new(uuid: impl Into<String>, major: u16, minor: u16) -> Self {
        BeaconIdentity {
            uuid: uuid.into(),
            major,
            minor,
        }
    }

    /// 稳定的字符串键，格式 `uuid:major:minor`
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BeaconIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.uuid, self.major, self.minor)
    }
}

fn default_simulate() -> bool {
    true
}

/// 与单个信标绑定的实物资产
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub identity: BeaconIdentity,
    /// 显示名称
    pub name: String,
    /// 资产类型
    #[serde(default)]
    pub asset_type: String,
    /// 资产标签（如固定资产编号）
    #[serde(default)]
    pub tag: String,
    /// 位置提示，例如 "二楼机房"
    #[serde(default)]
    pub location_hint: Option<String>,
    /// 是否参与模拟，默认参与
    #[serde(default = "default_simulate")]
    pub simulate: bool,
}

impl Asset {
    pub fn new(identity: BeaconIdentity, name: impl Into<String>) -> Self {
        Asset {
            identity,
            name: name.into(),
            asset_type: String::new(),
            tag: String::new(),
            location_hint: None,
            simulate: true,
        }
    }

    pub fn with_type(mut self, asset_type: impl Into<String>) -> Self {
        self.asset_type = asset_type.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_location_hint(mut self, hint: impl Into<String>) -> Self {
        self.location_hint = Some(hint.into());
        self
    }

    pub fn with_simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    /// 站点分组（即 major）
    pub fn site(&self) -> u16 {
        self.identity.major
    }
}

/// 资产目录 - 保持外部提供的顺序
///
/// 模拟器按目录顺序选取前 N 个实体，所以这里用 Vec 而不是 HashMap。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetCatalog {
    assets: Vec<Asset>,
}

impl AssetCatalog {
    /// 创建空目录
    pub fn new() -> Self {
        AssetCatalog { assets: Vec::new() }
    }

    /// 从资产向量创建，相同身份的后者覆盖前者
    pub fn from_vec(assets: Vec<Asset>) -> Self {
        let mut catalog = AssetCatalog::new();
        for asset in assets {
            catalog.add_asset(asset);
        }
        catalog
    }

    /// 从本地 JSON 夹具加载（远程库存服务不可达时使用）
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let assets: Vec<Asset> = serde_json::from_str(json)?;
        Ok(Self::from_vec(assets))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// 添加资产；身份已存在时原位替换
    pub fn add_asset(&mut self, asset: Asset) {
        match self.assets.iter_mut().find(|a| a.identity == asset.identity) {
            Some(existing) => *existing = asset,
            None => self.assets.push(asset),
        }
    }

    pub fn get(&self, identity: &BeaconIdentity) -> Option<&Asset> {
        self.assets.iter().find(|a| &a.identity == identity)
    }

    pub fn remove(&mut self, identity: &BeaconIdentity) -> Option<Asset> {
        let idx = self.assets.iter().position(|a| &a.identity == identity)?;
        Some(self.assets.remove(idx))
    }

    /// 按目录顺序返回所有资产
    pub fn all(&self) -> &[Asset] {
        &self.assets
    }

    /// 目录中出现过的唯一身份（按目录顺序）
    pub fn identities(&self) -> Vec<BeaconIdentity> {
        self.assets.iter().map(|a| a.identity.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn clear(&mut self) {
        self.assets.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.iter()
    }

    /// 按过滤条件筛选，保持目录顺序
    pub fn filtered<'a>(&'a self, filter: &'a AssetFilter) -> impl Iterator<Item = &'a Asset> {
        self.assets.iter().filter(move |a| filter.matches(a))
    }
}

/// 资产过滤条件：站点 + 自由文本
///
/// 文本匹配不区分大小写，作用于名称、标签、类型和 minor 编号。
#[derive(Clone, Debug, Default)]
pub struct AssetFilter {
    site: Option<u16>,
    text: Option<String>,
    pattern: Option<Regex>,
}

impl AssetFilter {
    /// 不做任何过滤
    pub fn all() -> Self {
        AssetFilter::default()
    }

    pub fn site(site: u16) -> Self {
        AssetFilter::default().with_site(Some(site))
    }

    pub fn with_site(mut self, site: Option<u16>) -> Self {
        self.site = site;
        self
    }

    /// 设置自由文本；空白文本等同于不过滤
    pub fn with_text(mut self, text: impl AsRef<str>) -> Self {
        let trimmed = text.as_ref().trim();
        if trimmed.is_empty() {
            self.text = None;
            self.pattern = None;
            return self;
        }
        self.pattern = RegexBuilder::new(&regex::escape(trimmed))
            .case_insensitive(true)
            .build()
            .ok();
        self.text = Some(trimmed.to_lowercase());
        self
    }

    pub fn site_filter(&self) -> Option<u16> {
        self.site
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn matches(&self, asset: &Asset) -> bool {
        if let Some(site) = self.site {
            if asset.site() != site {
                return false;
            }
        }
        let Some(text) = &self.text else {
            return true;
        };

        let minor = asset.identity.minor.to_string();
        let fields = [
            asset.name.as_str(),
            asset.tag.as_str(),
            asset.asset_type.as_str(),
            minor.as_str(),
        ];
        match &self.pattern {
            Some(re) => fields.iter().any(|f| re.is_match(f)),
            None => fields.iter().any(|f| f.to_lowercase().contains(text.as_str())),
        }
    }
}
