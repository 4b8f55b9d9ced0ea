//! Entity behavior vectors: one binary row per entity, one column per item.

use coborrow_core::types::{EntityId, ItemId};
use coborrow_core::{BasketMatrix, CoborrowError, CoborrowResult};
use ndarray::Array2;
use std::collections::HashMap;

/// Entity × item occurrence matrix. Rows follow `entities`, columns follow
/// `items`, both ascending.
#[derive(Debug, Clone)]
pub struct BehaviorMatrix {
    pub entities: Vec<EntityId>,
    pub items: Vec<ItemId>,
    pub occurrence: Array2<f64>,
}

impl BehaviorMatrix {
    /// Cell is 1.0 if the entity ever transacted the item, in any transaction.
    pub fn from_basket(basket: &BasketMatrix) -> Self {
        let entity_items = basket.entity_items();
        let items = basket.items();
        let column: HashMap<ItemId, usize> = items.iter().enumerate().map(|(j, &item)| (item, j)).collect();

        let mut occurrence = Array2::<f64>::zeros((entity_items.len(), items.len()));
        for (i, taken) in entity_items.values().enumerate() {
            for item in taken {
                occurrence[[i, column[item]]] = 1.0;
            }
        }

        Self {
            entities: entity_items.into_keys().collect(),
            items,
            occurrence,
        }
    }

    pub fn n_entities(&self) -> usize {
        self.entities.len()
    }

    /// Row-wise L2-normalized copy of the occurrence matrix.
    pub fn normalized(&self) -> CoborrowResult<Array2<f64>> {
        l2_normalize_rows(&self.occurrence).map_err(|row| CoborrowError::DegenerateVector {
            entity_id: self.entities[row],
        })
    }
}

/// Divide every row by its Euclidean norm, returning a new matrix.
/// Fails with the index of the first all-zero row.
pub fn l2_normalize_rows(matrix: &Array2<f64>) -> Result<Array2<f64>, usize> {
    let mut out = matrix.to_owned();
    for (i, mut row) in out.rows_mut().into_iter().enumerate() {
        let norm = row.dot(&row).sqrt();
        if norm == 0.0 {
            return Err(i);
        }
        row /= norm;
    }
    Ok(out)
}
