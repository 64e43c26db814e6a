use serde::{Deserialize, Serialize};

/// Deck zone a crane works from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Position {
    Fwd,
    Mid,
    Aft,
    Poop,
}

impl Position {
    pub const ALL: [Position; 4] = [Position::Fwd, Position::Mid, Position::Aft, Position::Poop];

    pub fn label(self) -> &'static str {
        match self {
            Position::Fwd => "FWD",
            Position::Mid => "MID",
            Position::Aft => "AFT",
            Position::Poop => "POOP",
        }
    }

    pub fn parse(s: &str) -> Option<Position> {
        Position::ALL
            .into_iter()
            .find(|p| p.label().eq_ignore_ascii_case(s.trim()))
    }

    fn index(self) -> usize {
        match self {
            Position::Fwd => 0,
            Position::Mid => 1,
            Position::Aft => 2,
            Position::Poop => 3,
        }
    }
}

/// Kind of counted crane operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Load,
    Discharge,
    RestowLoad,
    RestowDisch,
    HatchOpen,
    HatchClose,
}

const MOVE_POSITIONS: &[Position] = &Position::ALL;
const HATCH_POSITIONS: &[Position] = &[Position::Fwd, Position::Mid, Position::Aft];

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Load,
        Category::Discharge,
        Category::RestowLoad,
        Category::RestowDisch,
        Category::HatchOpen,
        Category::HatchClose,
    ];

    /// Categories that carry a planned figure and an opening balance.
    pub const PLANNED: [Category; 4] = [
        Category::Load,
        Category::Discharge,
        Category::RestowLoad,
        Category::RestowDisch,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Category::Load => "load",
            Category::Discharge => "discharge",
            Category::RestowLoad => "restow_load",
            Category::RestowDisch => "restow_disch",
            Category::HatchOpen => "hatch_open",
            Category::HatchClose => "hatch_close",
        }
    }

    /// Positions that exist for this category. Hatch covers have no POOP position.
    pub fn positions(self) -> &'static [Position] {
        match self {
            Category::HatchOpen | Category::HatchClose => HATCH_POSITIONS,
            _ => MOVE_POSITIONS,
        }
    }

    pub fn uses(self, p: Position) -> bool {
        self.positions().contains(&p)
    }

    pub fn is_planned(self) -> bool {
        !matches!(self, Category::HatchOpen | Category::HatchClose)
    }

    fn index(self) -> usize {
        match self {
            Category::Load => 0,
            Category::Discharge => 1,
            Category::RestowLoad => 2,
            Category::RestowDisch => 3,
            Category::HatchOpen => 4,
            Category::HatchClose => 5,
        }
    }
}

/// Clamp a user-supplied count to the non-negative range.
pub fn clamp_count(v: i64) -> u64 {
    v.max(0) as u64
}

/// Per-position counts for every category.
///
/// Cells for positions a category does not have stay zero; writes to them are dropped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "GridRepr", into = "GridRepr")]
pub struct MoveGrid {
    cells: [[u32; 4]; 6],
}

impl MoveGrid {
    pub fn get(&self, c: Category, p: Position) -> u32 {
        self.cells[c.index()][p.index()]
    }

    pub fn set(&mut self, c: Category, p: Position, v: u32) {
        if c.uses(p) {
            self.cells[c.index()][p.index()] = v;
        }
    }

    pub fn category_total(&self, c: Category) -> u64 {
        c.positions().iter().map(|&p| u64::from(self.get(c, p))).sum()
    }

    pub fn accumulate(&mut self, other: &MoveGrid) {
        for c in Category::ALL {
            for &p in c.positions() {
                let v = self.get(c, p).saturating_add(other.get(c, p));
                self.set(c, p, v);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == MoveGrid::default()
    }

    /// Every (category, position) cell that exists, in a stable order.
    pub fn cells() -> impl Iterator<Item = (Category, Position)> {
        Category::ALL
            .into_iter()
            .flat_map(|c| c.positions().iter().map(move |&p| (c, p)))
    }
}

#[derive(Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", default)]
struct PositionCounts {
    fwd: i64,
    mid: i64,
    aft: i64,
    poop: i64,
}

impl PositionCounts {
    fn get(&self, p: Position) -> i64 {
        match p {
            Position::Fwd => self.fwd,
            Position::Mid => self.mid,
            Position::Aft => self.aft,
            Position::Poop => self.poop,
        }
    }

    fn from_grid(grid: &MoveGrid, c: Category) -> Self {
        PositionCounts {
            fwd: grid.get(c, Position::Fwd).into(),
            mid: grid.get(c, Position::Mid).into(),
            aft: grid.get(c, Position::Aft).into(),
            poop: grid.get(c, Position::Poop).into(),
        }
    }
}

// Wire shape: `{"load": {"FWD": 3, "MID": 1}, "hatch_open": {"AFT": 2}, ...}`.
#[derive(Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
struct GridRepr {
    load: PositionCounts,
    discharge: PositionCounts,
    restow_load: PositionCounts,
    restow_disch: PositionCounts,
    hatch_open: PositionCounts,
    hatch_close: PositionCounts,
}

impl GridRepr {
    fn slot(&self, c: Category) -> &PositionCounts {
        match c {
            Category::Load => &self.load,
            Category::Discharge => &self.discharge,
            Category::RestowLoad => &self.restow_load,
            Category::RestowDisch => &self.restow_disch,
            Category::HatchOpen => &self.hatch_open,
            Category::HatchClose => &self.hatch_close,
        }
    }
}

impl From<GridRepr> for MoveGrid {
    fn from(r: GridRepr) -> Self {
        let mut grid = MoveGrid::default();
        for (c, p) in MoveGrid::cells() {
            let v = clamp_count(r.slot(c).get(p)).min(u64::from(u32::MAX)) as u32;
            grid.set(c, p, v);
        }
        grid
    }
}

impl From<MoveGrid> for GridRepr {
    fn from(g: MoveGrid) -> Self {
        GridRepr {
            load: PositionCounts::from_grid(&g, Category::Load),
            discharge: PositionCounts::from_grid(&g, Category::Discharge),
            restow_load: PositionCounts::from_grid(&g, Category::RestowLoad),
            restow_disch: PositionCounts::from_grid(&g, Category::RestowDisch),
            hatch_open: PositionCounts::from_grid(&g, Category::HatchOpen),
            hatch_close: PositionCounts::from_grid(&g, Category::HatchClose),
        }
    }
}

/// One total per category.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryTotals {
    pub load: u64,
    pub discharge: u64,
    pub restow_load: u64,
    pub restow_disch: u64,
    pub hatch_open: u64,
    pub hatch_close: u64,
}

impl CategoryTotals {
    pub fn get(&self, c: Category) -> u64 {
        match c {
            Category::Load => self.load,
            Category::Discharge => self.discharge,
            Category::RestowLoad => self.restow_load,
            Category::RestowDisch => self.restow_disch,
            Category::HatchOpen => self.hatch_open,
            Category::HatchClose => self.hatch_close,
        }
    }

    pub fn get_mut(&mut self, c: Category) -> &mut u64 {
        match c {
            Category::Load => &mut self.load,
            Category::Discharge => &mut self.discharge,
            Category::RestowLoad => &mut self.restow_load,
            Category::RestowDisch => &mut self.restow_disch,
            Category::HatchOpen => &mut self.hatch_open,
            Category::HatchClose => &mut self.hatch_close,
        }
    }

    pub fn of_grid(grid: &MoveGrid) -> Self {
        let mut out = CategoryTotals::default();
        for c in Category::ALL {
            *out.get_mut(c) = grid.category_total(c);
        }
        out
    }
}

/// Figures kept only for the four planned categories (plan targets, opening balances).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanFigures {
    pub load: u64,
    pub discharge: u64,
    pub restow_load: u64,
    pub restow_disch: u64,
}

impl PlanFigures {
    /// Hatch categories have no figure and read as zero.
    pub fn get(&self, c: Category) -> u64 {
        match c {
            Category::Load => self.load,
            Category::Discharge => self.discharge,
            Category::RestowLoad => self.restow_load,
            Category::RestowDisch => self.restow_disch,
            Category::HatchOpen | Category::HatchClose => 0,
        }
    }

    pub fn set(&mut self, c: Category, v: u64) {
        match c {
            Category::Load => self.load = v,
            Category::Discharge => self.discharge = v,
            Category::RestowLoad => self.restow_load = v,
            Category::RestowDisch => self.restow_disch = v,
            Category::HatchOpen | Category::HatchClose => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hatch_poop_cell_is_never_written() {
        let mut g = MoveGrid::default();
        g.set(Category::HatchOpen, Position::Poop, 9);
        g.set(Category::HatchOpen, Position::Fwd, 2);
        assert_eq!(g.get(Category::HatchOpen, Position::Poop), 0);
        assert_eq!(g.category_total(Category::HatchOpen), 2);
        assert_eq!(MoveGrid::cells().count(), 22);
    }

    #[test]
    fn grid_json_clamps_negatives_and_fills_missing() {
        let g: MoveGrid = serde_json::from_str(
            r#"{"load":{"FWD":10,"MID":-4},"hatch_close":{"POOP":7,"AFT":1},"bogus":1}"#,
        )
        .unwrap();
        assert_eq!(g.get(Category::Load, Position::Fwd), 10);
        assert_eq!(g.get(Category::Load, Position::Mid), 0);
        assert_eq!(g.get(Category::Discharge, Position::Aft), 0);
        assert_eq!(g.category_total(Category::HatchClose), 1);

        let back: MoveGrid = serde_json::from_value(serde_json::to_value(g).unwrap()).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn position_parse_is_case_insensitive() {
        assert_eq!(Position::parse(" poop"), Some(Position::Poop));
        assert_eq!(Position::parse("STERN"), None);
    }

    #[test]
    fn plan_figures_ignore_hatch_categories() {
        let mut p = PlanFigures::default();
        p.set(Category::HatchOpen, 5);
        p.set(Category::RestowDisch, 3);
        assert_eq!(p.get(Category::HatchOpen), 0);
        assert_eq!(p.restow_disch, 3);
    }
}
