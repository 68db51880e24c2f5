pub mod hatch;
pub mod kernel;
pub mod model;
pub mod rings;

pub mod geometry {
    use glam::{DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示。填充线段与边界多边形使用该类型。
    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    /// 三维点。坐标始终以独立的 x/y/z 保存，不做任何吸附。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn has_z(self) -> bool {
            self.0.z != 0.0
        }

        #[inline]
        pub fn translate(self, offset: Vector3) -> Self {
            Self(self.0 + offset.0)
        }
    }

    /// 三维平移量，块插入时使用。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector3(pub DVec3);

    impl Vector3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }
    }

    impl From<Point3> for Vector3 {
        fn from(value: Point3) -> Self {
            Self(value.0)
        }
    }
}

pub mod options {
    use std::fmt;
    use std::str::FromStr;

    use serde::{Deserialize, Serialize};

    /// 维度判定策略：自动检测 Z 值，或强制 2D/3D。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum DimensionMode {
        #[serde(rename = "auto")]
        Auto,
        #[serde(rename = "2d")]
        Force2d,
        #[serde(rename = "3d")]
        Force3d,
    }

    impl Default for DimensionMode {
        fn default() -> Self {
            DimensionMode::Auto
        }
    }

    impl FromStr for DimensionMode {
        type Err = UnknownMode;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.trim().to_ascii_lowercase().as_str() {
                "auto" => Ok(DimensionMode::Auto),
                "2d" => Ok(DimensionMode::Force2d),
                "3d" => Ok(DimensionMode::Force3d),
                other => Err(UnknownMode(other.to_string())),
            }
        }
    }

    /// 环重建模式。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum RingMode {
        None,
        Link,
        Split,
    }

    impl Default for RingMode {
        fn default() -> Self {
            RingMode::None
        }
    }

    impl FromStr for RingMode {
        type Err = UnknownMode;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.trim().to_ascii_lowercase().as_str() {
                "none" => Ok(RingMode::None),
                "link" => Ok(RingMode::Link),
                "split" => Ok(RingMode::Split),
                other => Err(UnknownMode(other.to_string())),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct UnknownMode(pub String);

    impl fmt::Display for UnknownMode {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "未知的模式取值 \"{}\"", self.0)
        }
    }

    impl std::error::Error for UnknownMode {}

    /// 一次导入的构造参数。
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct ImportOptions {
        /// 目标 SRID，`None` 表示未设置。
        #[serde(default)]
        pub srid: Option<i32>,
        #[serde(default)]
        pub dimension: DimensionMode,
        /// 仅导入该名称的图层。
        #[serde(default)]
        pub layer_filter: Option<String>,
        #[serde(default)]
        pub ring_mode: RingMode,
    }

    impl ImportOptions {
        /// 判断图层是否通过单图层过滤。
        #[inline]
        pub fn accepts_layer(&self, name: &str) -> bool {
            match self.layer_filter.as_deref() {
                Some(filter) => filter == name,
                None => true,
            }
        }
    }

}
