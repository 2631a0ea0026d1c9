use crate::real;

const EXP_TABLE_SIZE: usize = 1000;
const MAX_EXP: real = 6.0;

/// Precomputed logistic function over `[-MAX_EXP, MAX_EXP]`. Outside that
/// range it saturates to 0 or 1.
pub struct SigmoidTable {
    table: Vec<real>,
}

impl SigmoidTable {
    pub fn new() -> Self {
        let table = (0..EXP_TABLE_SIZE)
            .map(|i| {
                let e = ((i as real / EXP_TABLE_SIZE as real * 2.0 - 1.0) * MAX_EXP).exp();
                e / (e + 1.0)
            })
            .collect();
        SigmoidTable { table }
    }

    #[inline]
    pub fn get(&self, x: real) -> real {
        if x <= -MAX_EXP {
            0.0
        } else if x >= MAX_EXP {
            1.0
        } else {
            let i = ((x + MAX_EXP) * (EXP_TABLE_SIZE as real / MAX_EXP / 2.0)) as usize;
            self.table[i.min(EXP_TABLE_SIZE - 1)]
        }
    }
}

impl Default for SigmoidTable {
    fn default() -> Self {
        SigmoidTable::new()
    }
}
