//! # FEFF 输入文件生成
//!
//! 把一个近邻壳层写成 `feff.inp`。
//!
//! ## feff.inp 结构
//! ```text
//! TITLE ...                 # 头部模板，占位符 {frame} {atom} {absorber} {cutoff}
//! EDGE K
//! ...
//! POTENTIALS
//!     0   92  U             # ipot 0 = 吸收原子
//!     1    8  O             # 其余元素按首次出现顺序编号
//! ATOMS
//!    0.00000   0.00000   0.00000   0  U    0.00000
//!    1.36720   1.36720   1.36720   1  O    2.36806
//! END
//! ```
//!
//! ## 依赖关系
//! - 被 `commands/process.rs` 调用
//! - 使用 `geometry/neighbors.rs`, `models/elements.rs`

use crate::error::{MdExafsError, Result};
use crate::geometry::neighbors::NeighborShell;
use crate::models::elements::atomic_number;
use crate::models::path::normalize_element;

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// 未配置模板时使用的 EXAFS 头部
pub const DEFAULT_HEADER: &str = "\
TITLE md-exafs frame {frame} atom {atom} absorber {absorber}

EDGE      K
S02       1.0
CONTROL   1 1 1 1 1 1
PRINT     0 0 0 0 0 3
EXCHANGE  0
SCF       4.5
EXAFS     20.0
RPATH     {cutoff}
";

/// 读取头部模板；未配置时返回内置模板
pub fn load_header_template(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path).map_err(|e| MdExafsError::read(path, e)),
        None => Ok(DEFAULT_HEADER.to_string()),
    }
}

fn render_header(template: &str, shell: &NeighborShell, absorber: &str) -> String {
    template
        .replace("{frame}", &shell.frame.to_string())
        .replace("{atom}", &shell.center.to_string())
        .replace("{absorber}", absorber)
        .replace("{cutoff}", &format!("{:.4}", shell.cutoff))
}

fn z_of(symbol: &str) -> Result<u32> {
    atomic_number(symbol).ok_or_else(|| {
        MdExafsError::InvalidConfig(format!(
            "unknown element symbol '{}' (check the [atom_types] mapping)",
            symbol
        ))
    })
}

/// 生成 feff.inp 内容
pub fn to_feff_inp_string(shell: &NeighborShell, header_template: &str) -> Result<String> {
    let absorber = normalize_element(&shell.center_element);

    // POTENTIALS：吸收原子单独占 ipot 0
    let mut potentials: Vec<(String, u32)> = vec![(absorber.clone(), z_of(&absorber)?)];
    let mut neighbor_ipots = Vec::with_capacity(shell.len());
    for neighbor in &shell.neighbors {
        let element = normalize_element(&neighbor.element);
        let ipot = match potentials.iter().skip(1).position(|(e, _)| *e == element) {
            Some(i) => i + 1,
            None => {
                let z = z_of(&element)?;
                potentials.push((element.clone(), z));
                potentials.len() - 1
            }
        };
        neighbor_ipots.push((ipot, element));
    }

    let mut out = render_header(header_template, shell, &absorber);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');

    out.push_str("POTENTIALS\n");
    out.push_str("*   ipot   Z  element\n");
    for (ipot, (element, z)) in potentials.iter().enumerate() {
        let _ = writeln!(out, "    {:4} {:4}  {}", ipot, z, element);
    }
    out.push('\n');

    out.push_str("ATOMS\n");
    out.push_str("*        x          y          z    ipot  tag     distance\n");
    let _ = writeln!(
        out,
        "  {:10.5} {:10.5} {:10.5} {:4}  {:<6} {:10.5}",
        0.0, 0.0, 0.0, 0, absorber, 0.0
    );
    for (neighbor, (ipot, element)) in shell.neighbors.iter().zip(&neighbor_ipots) {
        let d = neighbor.displacement;
        let _ = writeln!(
            out,
            "  {:10.5} {:10.5} {:10.5} {:4}  {:<6} {:10.5}",
            d[0], d[1], d[2], ipot, element, neighbor.distance
        );
    }
    out.push_str("END\n");

    Ok(out)
}

/// 写入 feff.inp（先写临时文件再重命名，重复执行结果一致）
pub fn write_feff_input(dir: &Path, content: &str) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| MdExafsError::write(dir, e))?;

    let target = dir.join(crate::batch::layout::DECK_FILE);
    let tmp = dir.join(".feff.inp.tmp");
    fs::write(&tmp, content).map_err(|e| MdExafsError::write(&tmp, e))?;
    fs::rename(&tmp, &target).map_err(|e| MdExafsError::write(&target, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::neighbors::Neighbor;

    fn shell() -> NeighborShell {
        let n = |index: usize, element: &str, d: [f64; 3]| Neighbor {
            index,
            element: element.to_string(),
            displacement: d,
            distance: (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt(),
        };
        NeighborShell {
            frame: 3,
            center: 12,
            center_element: "U".to_string(),
            cutoff: 4.0,
            neighbors: vec![
                n(40, "O", [1.3672, 1.3672, 1.3672]),
                n(41, "O", [-1.3672, 1.3672, 1.3672]),
                n(7, "U", [2.7344, 2.7344, 0.0]),
            ],
        }
    }

    #[test]
    fn test_potentials_and_atoms() {
        let text = to_feff_inp_string(&shell(), DEFAULT_HEADER).unwrap();

        assert!(text.starts_with("TITLE md-exafs frame 3 atom 12 absorber U"));
        assert!(text.contains("RPATH     4.0000"));

        let pots: Vec<&str> = text
            .lines()
            .skip_while(|l| *l != "POTENTIALS")
            .skip(2)
            .take_while(|l| !l.trim().is_empty())
            .collect();
        assert_eq!(pots.len(), 3);
        assert_eq!(pots[0].split_whitespace().collect::<Vec<_>>(), ["0", "92", "U"]);
        assert_eq!(pots[1].split_whitespace().collect::<Vec<_>>(), ["1", "8", "O"]);
        assert_eq!(pots[2].split_whitespace().collect::<Vec<_>>(), ["2", "92", "U"]);

        let atoms: Vec<Vec<&str>> = text
            .lines()
            .skip_while(|l| *l != "ATOMS")
            .skip(2)
            .take_while(|l| *l != "END")
            .map(|l| l.split_whitespace().collect())
            .collect();
        assert_eq!(atoms.len(), 4);
        assert_eq!(atoms[0][3], "0");
        assert_eq!(atoms[1][3..5], ["1", "O"]);
        assert_eq!(atoms[3][3..5], ["2", "U"]);
        assert!(text.ends_with("END\n"));
    }

    #[test]
    fn test_unknown_element_is_rejected() {
        let mut s = shell();
        s.neighbors[0].element = "Qx".to_string();
        assert!(matches!(
            to_feff_inp_string(&s, DEFAULT_HEADER),
            Err(MdExafsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_write_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("frame_3").join("atom_12");
        let text = to_feff_inp_string(&shell(), "TITLE custom {absorber}\n").unwrap();

        write_feff_input(&dir, &text).unwrap();
        write_feff_input(&dir, &text).unwrap();

        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(fs::read_to_string(dir.join("feff.inp")).unwrap(), text);
        assert!(text.starts_with("TITLE custom U\n"));
    }
}
