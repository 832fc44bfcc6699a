//! Single-level rewrites solved end to end.
//!
//! Each case is a tiny bilevel problem whose outer objective profits from an
//! inner point that is feasible but not optimal. The rewrite has to close that
//! loophole.

use metaopt::adapter::solver::HiGHSSolver;
use metaopt::application::rewrite::{Rewrite, RewriteKind};
use metaopt::domain::constraint::VariableBounds;
use metaopt::domain::model::Model;
use metaopt::domain::polynomial::{Polynomial, Var};
use metaopt::error::{ConfigError, Error};
use metaopt::port::{ObjectiveSense, RewriteGenerator, Solver};

const TOL: f64 = 1e-6;

/// `max x s.t. x <= bound, x >= 0` recorded on `rewrite`.
fn bounded_inner(rewrite: &mut Rewrite, model: &mut Model, bound: Polynomial, skip_extra: bool) -> Var {
    let x = rewrite.inner_variable(model, "x");
    rewrite
        .add_leq_zero(model, Polynomial::term(x, 1.0) - bound)
        .unwrap();
    rewrite.add_leq_zero(model, Polynomial::term(x, -1.0)).unwrap();
    rewrite
        .add_maximization_constraints(model, &Polynomial::term(x, 1.0), skip_extra)
        .unwrap();
    x
}

fn maximize(model: &Model, objective: &Polynomial) -> f64 {
    HiGHSSolver::new()
        .solve(model, objective, ObjectiveSense::Maximize)
        .unwrap()
        .into_result()
        .unwrap()
        .objective()
}

#[test]
fn kkt_forces_the_inner_optimum() {
    for (skip_extra, expected) in [(false, 0.0), (true, 5.0)] {
        let mut model = Model::new();
        let p = model.continuous("p", VariableBounds::bounded(0.0, 5.0));
        let mut rewrite = Rewrite::with_parameters(RewriteKind::Kkt, 100.0, &model, &[p]).unwrap();
        let x = bounded_inner(&mut rewrite, &mut model, Polynomial::term(p, 1.0), skip_extra);

        // The outer level wants p large and x small; optimality ties x to p.
        let objective = Polynomial::term(p, 1.0).with_term(x, -2.0);
        let value = maximize(&model, &objective);
        assert!((value - expected).abs() <= TOL, "skip_extra={skip_extra}: {value}");
    }
}

#[test]
fn kkt_inner_value_follows_outer_constraints() {
    let mut model = Model::new();
    let p = model.continuous("p", VariableBounds::bounded(0.0, 5.0));
    let mut rewrite = Rewrite::with_parameters(RewriteKind::Kkt, 100.0, &model, &[p]).unwrap();
    let x = bounded_inner(&mut rewrite, &mut model, Polynomial::term(p, 1.0), false);
    model.add_leq_zero(Polynomial::constant(3.0).with_term(p, -1.0));

    let solution = HiGHSSolver::new()
        .solve(&model, &Polynomial::term(x, 1.0), ObjectiveSense::Minimize)
        .unwrap()
        .into_result()
        .unwrap();
    assert!((solution.value(x) - 3.0).abs() <= TOL);
    assert!((solution.value(p) - 3.0).abs() <= TOL);
}

#[test]
fn primal_dual_forces_the_inner_optimum_over_levels() {
    for (skip_extra, expected) in [(false, 0.0), (true, 7.0)] {
        let mut model = Model::new();
        let s = model.binary("s");
        let t = model.binary("t");
        let mut rewrite = Rewrite::with_parameters(RewriteKind::PrimalDual, 10.0, &model, &[s, t]).unwrap();
        let bound = Polynomial::term(s, 2.0).with_term(t, 5.0);
        let x = bounded_inner(&mut rewrite, &mut model, bound.clone(), skip_extra);

        let value = maximize(&model, &(bound - Polynomial::term(x, 1.0)));
        assert!((value - expected).abs() <= TOL, "skip_extra={skip_extra}: {value}");
    }
}

#[test]
fn primal_dual_rejects_continuous_parameters() {
    let mut model = Model::new();
    let p = model.continuous("p", VariableBounds::bounded(0.0, 1.0));

    let err = Rewrite::with_parameters(RewriteKind::PrimalDual, 10.0, &model, &[p]).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::NonBinaryParameter { .. })));

    let rewrite = Rewrite::with_parameters(RewriteKind::Kkt, 10.0, &model, &[p]).unwrap();
    assert_eq!(rewrite.kind(), RewriteKind::Kkt);
}

