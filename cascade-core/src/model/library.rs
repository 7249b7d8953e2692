//! Built-in conditions and actions.
//!
//! Incarnations bring their own; these cover the handful of generic
//! behaviours (thresholds, concentration changes, transfer, movement,
//! removal) that models and tests reach for first.

use smallvec::smallvec;

use super::context::{Context, Dependencies, Dependency};
use super::molecule::Molecule;
use super::node::NodeId;
use super::reaction::{Action, Condition};
use crate::environment::{Environment, Position};
use crate::error::ReactionError;

/// Holds while the node's concentration of a molecule is at least `min`.
#[derive(Debug, Clone)]
pub struct Threshold {
    molecule: Molecule,
    min: f64,
}

impl Threshold {
    pub fn new(molecule: Molecule, min: f64) -> Self {
        Self { molecule, min }
    }
}

impl Condition for Threshold {
    fn context(&self) -> Context {
        Context::Local
    }

    fn inbound_dependencies(&self) -> Dependencies {
        smallvec![Dependency::Molecule(self.molecule.clone())]
    }

    fn is_valid(&self, env: &Environment, node: NodeId) -> Result<bool, ReactionError> {
        Ok(env.node(node)?.concentration(&self.molecule) >= self.min)
    }
}

/// Adds `delta` to the node's own concentration of a molecule.
#[derive(Debug, Clone)]
pub struct ChangeConcentration {
    molecule: Molecule,
    delta: f64,
}

impl ChangeConcentration {
    pub fn new(molecule: Molecule, delta: f64) -> Self {
        Self { molecule, delta }
    }
}

impl Action for ChangeConcentration {
    fn context(&self) -> Context {
        Context::Local
    }

    fn outbound_dependencies(&self) -> Dependencies {
        smallvec![Dependency::Molecule(self.molecule.clone())]
    }

    fn execute(&mut self, env: &mut Environment, node: NodeId) -> Result<(), ReactionError> {
        env.node_mut(node)?.change_concentration(&self.molecule, self.delta);
        Ok(())
    }
}

/// Moves `amount` of a molecule from the node to one of its neighbors.
///
/// Fails if `target` is not currently a neighbor.
#[derive(Debug, Clone)]
pub struct TransferToNeighbor {
    molecule: Molecule,
    amount: f64,
    target: NodeId,
}

impl TransferToNeighbor {
    pub fn new(molecule: Molecule, amount: f64, target: NodeId) -> Self {
        Self { molecule, amount, target }
    }
}

impl Action for TransferToNeighbor {
    fn context(&self) -> Context {
        Context::Neighborhood
    }

    fn outbound_dependencies(&self) -> Dependencies {
        smallvec![Dependency::Molecule(self.molecule.clone())]
    }

    fn execute(&mut self, env: &mut Environment, node: NodeId) -> Result<(), ReactionError> {
        if !env.neighborhood(node)?.contains(self.target) {
            return Err(ReactionError::failed(format!(
                "{} is not a neighbor of {}",
                self.target, node
            )));
        }
        env.node_mut(node)?.change_concentration(&self.molecule, -self.amount);
        env.node_mut(self.target)?
            .change_concentration(&self.molecule, self.amount);
        Ok(())
    }
}

/// Displaces the node by a fixed vector.
///
/// Movement changes topology, so it declares `Everything`.
#[derive(Debug, Clone)]
pub struct MoveBy {
    delta: Position,
}

impl MoveBy {
    pub fn new(delta: impl Into<Position>) -> Self {
        Self { delta: delta.into() }
    }
}

impl Action for MoveBy {
    fn context(&self) -> Context {
        Context::Local
    }

    fn execute(&mut self, env: &mut Environment, node: NodeId) -> Result<(), ReactionError> {
        env.move_node(node, &self.delta)?;
        Ok(())
    }
}

/// Removes the node the reaction lives on, together with all its reactions.
#[derive(Debug, Clone, Default)]
pub struct RemoveOwnNode;

impl Action for RemoveOwnNode {
    fn context(&self) -> Context {
        Context::Neighborhood
    }

    fn execute(&mut self, env: &mut Environment, node: NodeId) -> Result<(), ReactionError> {
        env.remove_node(node)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{ConnectWithinDistance, Environment};
    use crate::model::Node;

    fn pair() -> (Environment, NodeId, NodeId) {
        let mut env = Environment::builder()
            .linking_rule(ConnectWithinDistance::new(1.5))
            .build()
            .unwrap();
        let a = Node::new();
        let b = Node::new();
        let (ia, ib) = (a.id(), b.id());
        env.add_node(a, [0.0, 0.0]).unwrap();
        env.add_node(b, [1.0, 0.0]).unwrap();
        (env, ia, ib)
    }

    #[test]
    fn threshold_reads_own_node() {
        let (mut env, a, _) = pair();
        let m = Molecule::new("m");
        let condition = Threshold::new(m.clone(), 2.0);
        assert!(!condition.is_valid(&env, a).unwrap());
        env.node_mut(a).unwrap().set_concentration(m, 2.0);
        assert!(condition.is_valid(&env, a).unwrap());
    }

    #[test]
    fn transfer_moves_quantity() {
        let (mut env, a, b) = pair();
        let m = Molecule::new("m");
        env.node_mut(a).unwrap().set_concentration(m.clone(), 3.0);

        let mut action = TransferToNeighbor::new(m.clone(), 1.0, b);
        action.execute(&mut env, a).unwrap();

        assert_eq!(env.node(a).unwrap().concentration(&m), 2.0);
        assert_eq!(env.node(b).unwrap().concentration(&m), 1.0);
    }

    #[test]
    fn transfer_to_stranger_fails() {
        let (mut env, a, b) = pair();
        env.move_node_to(b, [10.0, 0.0]).unwrap();
        let mut action = TransferToNeighbor::new(Molecule::new("m"), 1.0, b);
        assert!(action.execute(&mut env, a).is_err());
    }

    #[test]
    fn move_and_remove() {
        let (mut env, a, b) = pair();
        MoveBy::new([5.0, 0.0]).execute(&mut env, a).unwrap();
        assert!(env.neighborhood(b).unwrap().is_empty());

        RemoveOwnNode.execute(&mut env, a).unwrap();
        assert!(!env.contains_node(a));
    }
}
