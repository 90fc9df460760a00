use crate::inst::Word;

/// Word-addressed data memory. Accesses outside `0..size` are refused rather
/// than wrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMemory {
    cells: Vec<Word>,
}

impl DataMemory {
    pub fn new(size: usize) -> Self {
        Self {
            cells: vec![0; size],
        }
    }

    fn index(&self, addr: Word) -> Option<usize> {
        usize::try_from(addr).ok().filter(|&i| i < self.cells.len())
    }

    pub fn read(&self, addr: Word) -> Option<Word> {
        self.index(addr).map(|i| self.cells[i])
    }

    #[must_use]
    pub fn write(&mut self, addr: Word, val: Word) -> Option<()> {
        let i = self.index(addr)?;
        self.cells[i] = val;
        Some(())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn words(&self) -> &[Word] {
        &self.cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let mut mem = DataMemory::new(16);
        assert_eq!(mem.write(15, 7), Some(()));
        assert_eq!(mem.read(15), Some(7));
        assert_eq!(mem.write(16, 1), None);
        assert_eq!(mem.read(-1), None);
        assert_eq!(mem.words().iter().sum::<Word>(), 7);
    }
}
