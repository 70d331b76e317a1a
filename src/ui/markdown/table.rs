use pulldown_cmark::Alignment;
use unicode_width::UnicodeWidthStr;

/// Collects markdown table events and lays the cells out as padded pipe rows.
pub(super) struct TableRenderer {
    alignments: Vec<Alignment>,
    rows: Vec<Vec<String>>,
    current_row: Vec<String>,
    current_cell: String,
    header_rows: usize,
    in_header: bool,
}

impl TableRenderer {
    pub(super) fn new(alignments: Vec<Alignment>) -> Self {
        Self {
            alignments,
            rows: Vec::new(),
            current_row: Vec::new(),
            current_cell: String::new(),
            header_rows: 0,
            in_header: false,
        }
    }

    pub(super) fn start_header(&mut self) {
        self.in_header = true;
    }

    pub(super) fn end_header(&mut self) {
        self.in_header = false;
        self.finish_row();
        self.header_rows = self.rows.len();
    }

    pub(super) fn end_row(&mut self) {
        self.finish_row();
    }

    fn finish_row(&mut self) {
        if !self.current_row.is_empty() {
            self.rows.push(std::mem::take(&mut self.current_row));
        }
    }

    pub(super) fn start_cell(&mut self) {
        self.current_cell.clear();
    }

    pub(super) fn end_cell(&mut self) {
        let cell = std::mem::take(&mut self.current_cell);
        self.current_row.push(cell.trim().to_string());
    }

    pub(super) fn push_text(&mut self, text: &str) {
        self.current_cell.push_str(text);
    }

    fn column_widths(&self) -> Vec<usize> {
        let columns = self
            .rows
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(self.alignments.len());
        let mut widths = vec![3; columns];
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(UnicodeWidthStr::width(cell.as_str()));
            }
        }
        widths
    }

    fn alignment(&self, column: usize) -> Alignment {
        self.alignments
            .get(column)
            .copied()
            .unwrap_or(Alignment::None)
    }

    fn pad(cell: &str, width: usize, alignment: Alignment) -> String {
        let fill = width.saturating_sub(UnicodeWidthStr::width(cell));
        match alignment {
            Alignment::Right => format!("{}{}", " ".repeat(fill), cell),
            Alignment::Center => {
                let left = fill / 2;
                format!("{}{}{}", " ".repeat(left), cell, " ".repeat(fill - left))
            }
            Alignment::Left | Alignment::None => format!("{}{}", cell, " ".repeat(fill)),
        }
    }

    fn separator(&self, widths: &[usize]) -> String {
        let cells: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, width)| match self.alignment(i) {
                Alignment::Left => format!(":{}", "-".repeat(width + 1)),
                Alignment::Right => format!("{}:", "-".repeat(width + 1)),
                Alignment::Center => format!(":{}:", "-".repeat(*width)),
                Alignment::None => "-".repeat(width + 2),
            })
            .collect();
        format!("|{}|", cells.join("|"))
    }

    pub(super) fn render(self) -> Vec<String> {
        let widths = self.column_widths();
        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        for (index, row) in self.rows.iter().enumerate() {
            let cells: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(i, width)| {
                    let cell = row.get(i).map(String::as_str).unwrap_or("");
                    Self::pad(cell, *width, self.alignment(i))
                })
                .collect();
            lines.push(format!("| {} |", cells.join(" | ")));
            if index + 1 == self.header_rows {
                lines.push(self.separator(&widths));
            }
        }
        lines
    }
}
