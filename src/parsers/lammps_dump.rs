//! # LAMMPS 文本轨迹解析器
//!
//! 读取 `dump ... custom` 产生的文本轨迹。
//!
//! ## 格式说明
//! ```text
//! ITEM: TIMESTEP
//! 180000
//! ITEM: NUMBER OF ATOMS
//! 4000
//! ITEM: BOX BOUNDS xy xz yz pp pp pp      # 正交盒子没有 "xy xz yz"
//! xlo_bound xhi_bound xy
//! ylo_bound yhi_bound xz
//! zlo_bound zhi_bound yz
//! ITEM: ATOMS id type x y z               # 也可为 element / xu yu zu / xs ys zs
//! 1 1 0.0 0.0 0.0
//! ...
//! ```
//!
//! 打开时只扫描一遍，记录每个 `ITEM: TIMESTEP` 的字节偏移；读取单帧时
//! 定位后解析，不把整条轨迹载入内存。
//!
//! 帧号取时间步，帧范围与 `frame_<n>` 目录名都按时间步计；时间步缺失或
//! 不严格递增时退回文件中的位置。原子按 id 排序，保证各帧原子序号一致。
//!
//! ## 依赖关系
//! - 被 `commands/process.rs`, `commands/rdf.rs` 使用
//! - 使用 `models/frame.rs`, `geometry/pbc.rs`

use crate::error::{MdExafsError, Result};
use crate::geometry::pbc::LatticeBox;
use crate::models::frame::{Frame, Trajectory};
use crate::models::path::normalize_element;
use crate::models::structure::Lattice;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

const FORMAT: &str = "LAMMPS dump";

/// LAMMPS 文本轨迹
#[derive(Debug)]
pub struct LammpsDump {
    path: PathBuf,
    /// 每帧 `ITEM: TIMESTEP` 行的字节偏移
    offsets: Vec<u64>,
    /// 每帧的帧号
    ids: Vec<usize>,
    file_len: u64,
    /// LAMMPS 原子类型 → 元素符号
    type_map: BTreeMap<String, String>,
}

impl LammpsDump {
    /// 打开轨迹并建立帧偏移表
    pub fn open(path: &Path, type_map: &BTreeMap<String, String>) -> Result<Self> {
        let file = File::open(path).map_err(|e| MdExafsError::read(path, e))?;
        let mut reader = BufReader::new(file);

        let mut offsets = Vec::new();
        let mut timesteps = Vec::new();
        let mut offset = 0u64;
        let mut line = String::new();
        let mut read_line = |line: &mut String| -> Result<u64> {
            line.clear();
            let n = reader
                .read_line(line)
                .map_err(|e| MdExafsError::read(path, e))?;
            Ok(n as u64)
        };
        loop {
            let n = read_line(&mut line)?;
            if n == 0 {
                break;
            }
            offset += n;
            if line.trim_end().starts_with("ITEM: TIMESTEP") {
                offsets.push(offset - n);
                offset += read_line(&mut line)?;
                timesteps.push(line.trim().parse::<usize>().ok());
            }
        }

        if offsets.is_empty() {
            return Err(MdExafsError::parse(FORMAT, path, "no 'ITEM: TIMESTEP' records"));
        }

        Ok(LammpsDump {
            path: path.to_path_buf(),
            offsets,
            ids: frame_ids(&timesteps),
            file_len: offset,
            type_map: type_map.clone(),
        })
    }

    fn read_block(&self, index: usize) -> Result<String> {
        let start = *self.offsets.get(index).ok_or_else(|| {
            MdExafsError::InvalidArgument(format!(
                "frame {} out of range ({} frames in {})",
                index,
                self.offsets.len(),
                self.path.display()
            ))
        })?;
        let end = self.offsets.get(index + 1).copied().unwrap_or(self.file_len);

        let mut file = File::open(&self.path).map_err(|e| MdExafsError::read(&self.path, e))?;
        file.seek(SeekFrom::Start(start))
            .map_err(|e| MdExafsError::read(&self.path, e))?;

        let mut text = String::with_capacity((end - start) as usize);
        file.take(end - start)
            .read_to_string(&mut text)
            .map_err(|e| MdExafsError::read(&self.path, e))?;
        Ok(text)
    }
}

impl Trajectory for LammpsDump {
    fn frame_count(&self) -> usize {
        self.offsets.len()
    }

    fn frame_id(&self, position: usize) -> usize {
        self.ids.get(position).copied().unwrap_or(position)
    }

    fn frame(&self, position: usize) -> Result<Frame> {
        let text = self.read_block(position)?;
        parse_frame(&text, self.frame_id(position), &self.type_map, &self.path)
    }
}

/// 时间步齐全且严格递增时作为帧号，否则用位置
fn frame_ids(timesteps: &[Option<usize>]) -> Vec<usize> {
    let steps: Option<Vec<usize>> = timesteps.iter().copied().collect();
    match steps {
        Some(steps) if steps.windows(2).all(|w| w[0] < w[1]) => steps,
        _ => (0..timesteps.len()).collect(),
    }
}

/// 盒子边界 → 晶格 + 原点
fn box_from_bounds(bounds: &[[f64; 3]; 3], triclinic: bool) -> (Lattice, [f64; 3]) {
    let (mut xlo, mut xhi) = (bounds[0][0], bounds[0][1]);
    let (mut ylo, mut yhi) = (bounds[1][0], bounds[1][1]);
    let (zlo, zhi) = (bounds[2][0], bounds[2][1]);

    if !triclinic {
        let lattice = Lattice::orthorhombic(xhi - xlo, yhi - ylo, zhi - zlo);
        return (lattice, [xlo, ylo, zlo]);
    }

    let (xy, xz, yz) = (bounds[0][2], bounds[1][2], bounds[2][2]);

    // bound 是包围盒，扣除倾斜量得到真实边界
    let tilts = [0.0, xy, xz, xy + xz];
    xlo -= tilts.iter().copied().fold(f64::INFINITY, f64::min);
    xhi -= tilts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    ylo -= 0f64.min(yz);
    yhi -= 0f64.max(yz);

    let lattice = Lattice::from_vectors([
        [xhi - xlo, 0.0, 0.0],
        [xy, yhi - ylo, 0.0],
        [xz, yz, zhi - zlo],
    ]);
    (lattice, [xlo, ylo, zlo])
}

/// 元素来源列
#[derive(Clone, Copy)]
enum Species {
    Element(usize),
    Type(usize),
}

enum Coordinates {
    Cartesian([usize; 3]),
    Scaled([usize; 3]),
}

/// 在列名中定位坐标列
fn coordinate_columns(columns: &[&str]) -> Option<Coordinates> {
    let find = |names: [&str; 3]| -> Option<[usize; 3]> {
        let mut idx = [0usize; 3];
        for (slot, name) in idx.iter_mut().zip(names) {
            *slot = columns.iter().position(|c| *c == name)?;
        }
        Some(idx)
    };

    find(["x", "y", "z"])
        .or_else(|| find(["xu", "yu", "zu"]))
        .map(Coordinates::Cartesian)
        .or_else(|| {
            find(["xs", "ys", "zs"])
                .or_else(|| find(["xsu", "ysu", "zsu"]))
                .map(Coordinates::Scaled)
        })
}

/// 解析单帧文本
pub fn parse_frame(
    text: &str,
    index: usize,
    type_map: &BTreeMap<String, String>,
    source: &Path,
) -> Result<Frame> {
    let err = |reason: String| MdExafsError::parse(FORMAT, source, format!("frame {}: {}", index, reason));

    let mut lines = text.lines();
    let mut timestep: Option<u64> = None;
    let mut natoms: Option<usize> = None;
    let mut bounds: Option<([[f64; 3]; 3], bool, [bool; 3])> = None;
    let mut atoms: Vec<(u64, [f64; 3], String)> = Vec::new();
    let mut lattice_box: Option<LatticeBox> = None;

    while let Some(line) = lines.next() {
        let line = line.trim();
        let Some(item) = line.strip_prefix("ITEM:") else {
            continue;
        };
        let item = item.trim();

        if item.starts_with("TIMESTEP") {
            let value = lines.next().ok_or_else(|| err("missing timestep value".into()))?;
            timestep = Some(
                value
                    .trim()
                    .parse()
                    .map_err(|_| err(format!("bad timestep '{}'", value.trim())))?,
            );
        } else if item.starts_with("NUMBER OF ATOMS") {
            let value = lines.next().ok_or_else(|| err("missing atom count".into()))?;
            natoms = Some(
                value
                    .trim()
                    .parse()
                    .map_err(|_| err(format!("bad atom count '{}'", value.trim())))?,
            );
        } else if let Some(rest) = item.strip_prefix("BOX BOUNDS") {
            let tokens: Vec<&str> = rest.split_whitespace().collect();
            let triclinic = tokens.contains(&"xy");
            let flags: Vec<&str> = tokens
                .iter()
                .copied()
                .filter(|t| !matches!(*t, "xy" | "xz" | "yz"))
                .collect();
            let mut pbc = [true; 3];
            if flags.len() == 3 {
                for (p, flag) in pbc.iter_mut().zip(&flags) {
                    *p = *flag == "pp";
                }
            }

            let mut values = [[0.0f64; 3]; 3];
            for row in values.iter_mut() {
                let line = lines.next().ok_or_else(|| err("truncated BOX BOUNDS".into()))?;
                let nums: Vec<f64> = line
                    .split_whitespace()
                    .map(|t| t.parse::<f64>())
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|_| err(format!("bad box bound line '{}'", line.trim())))?;
                let needed = if triclinic { 3 } else { 2 };
                if nums.len() < needed {
                    return Err(err(format!("bad box bound line '{}'", line.trim())));
                }
                row[..needed].copy_from_slice(&nums[..needed]);
            }
            bounds = Some((values, triclinic, pbc));
        } else if let Some(rest) = item.strip_prefix("ATOMS") {
            let n = natoms.ok_or_else(|| err("ATOMS before NUMBER OF ATOMS".into()))?;
            let (values, triclinic, pbc) =
                bounds.ok_or_else(|| err("ATOMS before BOX BOUNDS".into()))?;
            let (lattice, origin) = box_from_bounds(&values, triclinic);
            let current_box = LatticeBox::new(lattice, pbc)?.with_origin(origin);

            let columns: Vec<&str> = rest.split_whitespace().collect();
            let id_col = columns.iter().position(|c| *c == "id");
            let species = match (
                columns.iter().position(|c| *c == "element"),
                columns.iter().position(|c| *c == "type"),
            ) {
                (Some(col), _) => Species::Element(col),
                (None, Some(col)) => Species::Type(col),
                (None, None) => {
                    return Err(err("ATOMS has neither an 'element' nor a 'type' column".into()))
                }
            };
            let coords = coordinate_columns(&columns)
                .ok_or_else(|| err(format!("no coordinate columns in '{}'", rest.trim())))?;

            atoms.reserve(n);
            for row in 0..n {
                let line = lines
                    .next()
                    .ok_or_else(|| err(format!("expected {} atoms, found {}", n, row)))?;
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() < columns.len() {
                    return Err(err(format!("atom row {} has {} columns", row + 1, fields.len())));
                }

                let number = |col: usize| -> Result<f64> {
                    fields[col]
                        .parse::<f64>()
                        .map_err(|_| err(format!("bad number '{}' in atom row {}", fields[col], row + 1)))
                };

                let position = match &coords {
                    Coordinates::Cartesian(c) => [number(c[0])?, number(c[1])?, number(c[2])?],
                    Coordinates::Scaled(c) => {
                        let cart = current_box.frac_to_cart([number(c[0])?, number(c[1])?, number(c[2])?]);
                        [cart[0] + origin[0], cart[1] + origin[1], cart[2] + origin[2]]
                    }
                };

                let element = match species {
                    Species::Element(col) => normalize_element(fields[col]),
                    Species::Type(col) => type_map
                        .get(fields[col])
                        .map(|e| normalize_element(e))
                        .ok_or_else(|| {
                            MdExafsError::InvalidConfig(format!(
                                "LAMMPS atom type {} has no [atom_types] entry",
                                fields[col]
                            ))
                        })?,
                };

                let id = match id_col {
                    Some(col) => fields[col]
                        .parse::<u64>()
                        .map_err(|_| err(format!("bad atom id '{}'", fields[col])))?,
                    None => row as u64,
                };
                atoms.push((id, position, element));
            }
            lattice_box = Some(current_box);
        }
    }

    let lattice_box = lattice_box.ok_or_else(|| err("no ATOMS section".into()))?;

    atoms.sort_by_key(|(id, _, _)| *id);
    let (positions, elements) = atoms.into_iter().map(|(_, p, e)| (p, e)).unzip();

    let mut frame = Frame::new(index, positions, elements).with_lattice(lattice_box);
    frame.timestep = timestep;
    Ok(frame)
}
