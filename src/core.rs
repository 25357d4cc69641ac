use ndarray::{s, Array2, ArrayView1};
use rayon::prelude::*;

use crate::error::Result;

pub trait MarkovChain {
    /// Does one iteration of the chain, returning the new current state.
    fn step(&mut self) -> Result<ArrayView1<'_, f64>>;

    /// Get the current state without stepping.
    fn current_state(&self) -> ArrayView1<'_, f64>;
}

pub fn run_chain<M>(chain: &mut M, n_steps: usize) -> Result<Array2<f64>>
where
    M: MarkovChain,
{
    let dim = chain.current_state().len();
    let mut out = Array2::<f64>::zeros((n_steps, dim));

    for mut row in out.rows_mut() {
        let state = chain.step()?;
        row.assign(&state);
    }

    Ok(out)
}

/// A trait for "anything that owns multiple MarkovChains".
pub trait HasChains {
    type Chain: MarkovChain + std::marker::Send;

    /// Returns a mutable reference to the vector of chains.
    fn chains_mut(&mut self) -> &mut Vec<Self::Chain>;
}

pub trait ChainRunner: HasChains {
    /// Runs the chains in parallel, discarding burn-in.
    ///
    /// Returns one `(n_steps - discard) x npar` matrix per chain.
    fn run(&mut self, n_steps: usize, discard: usize) -> Result<Vec<Array2<f64>>> {
        // Run them all in parallel
        let results: Vec<Array2<f64>> = self
            .chains_mut()
            .par_iter_mut()
            .map(|chain| run_chain(chain, n_steps))
            .collect::<Result<_>>()?;

        // Now we can discard burn-in rows from each matrix
        Ok(results
            .into_iter()
            .map(|mat| {
                let keep_from = discard.min(mat.nrows());
                mat.slice(s![keep_from.., ..]).to_owned()
            })
            .collect())
    }
}

impl<T: HasChains> ChainRunner for T {}
