//! Resolving and fitting catalog models by name.

use approx::assert_relative_eq;
use curvefit_rs::fit::ParameterHint;
use curvefit_rs::{
    Algorithm, BuiltinModel, Dataset, FitConfig, Fitter, JacobianSource, ModelCatalog,
    ModelCategory, ModelError, ModelFunction, PeakShape,
};

fn grid(from: f64, to: f64, points: usize) -> Vec<f64> {
    (0..points)
        .map(|i| from + (to - from) * i as f64 / (points - 1) as f64)
        .collect()
}

#[test]
fn builtin_names_resolve_case_insensitively() {
    let catalog = ModelCatalog::new();

    let cases = [
        ("linear", BuiltinModel::Linear),
        ("POLY4", BuiltinModel::Polynomial { order: 4 }),
        ("ExpDecay2", BuiltinModel::ExpDecay { terms: 2 }),
        ("expgrowth", BuiltinModel::ExpGrowth),
        ("Logistic", BuiltinModel::Logistic),
        ("boltzmann", BuiltinModel::Boltzmann),
        (
            "Gauss3",
            BuiltinModel::PeakSum {
                shape: PeakShape::Gaussian,
                peaks: 3,
            },
        ),
        (
            "lorentz",
            BuiltinModel::PeakSum {
                shape: PeakShape::Lorentzian,
                peaks: 1,
            },
        ),
    ];
    for (name, expected) in cases {
        let model = catalog.resolve(name).unwrap();
        assert_eq!(model.category(), ModelCategory::BuiltIn);
        assert_eq!(model.name(), expected.name(), "{}", name);
    }

    for name in ["poly0", "expdecay4", "gauss0", "cubic"] {
        assert!(matches!(
            catalog.resolve(name),
            Err(ModelError::UnknownModel(_))
        ));
    }
}

#[test]
fn polynomial_order_is_clamped() {
    assert_eq!(curvefit_rs::models::polynomial(0).parameter_count(), 2);
    assert_eq!(curvefit_rs::models::polynomial(12).parameter_count(), 10);
    let poly = ModelCatalog::new().resolve("poly15").unwrap();
    assert_eq!(poly.parameter_count(), 10);
}

#[test]
fn parameter_counts_of_builtins() {
    let counts = [
        (BuiltinModel::Linear, 2),
        (curvefit_rs::models::exp_decay(3), 7),
        (BuiltinModel::ExpGrowth, 3),
        (BuiltinModel::Logistic, 4),
        (BuiltinModel::Boltzmann, 4),
        (curvefit_rs::models::gaussian(3), 10),
    ];
    for (model, count) in counts {
        assert_eq!(model.parameter_count(), count, "{}", model.name());
        assert_eq!(model.jacobian_source(), JacobianSource::Analytic);
    }
    assert_eq!(curvefit_rs::models::exp_decay(1).min_points(), 4);
}

#[test]
fn user_function_fits_with_numeric_derivatives() {
    let mut catalog = ModelCatalog::new();
    let decay = catalog
        .register_user("mydecay", "A*exp(-x/t) + y0")
        .unwrap();
    assert_eq!(decay.parameter_names(), vec!["A", "t", "y0"]);
    assert_eq!(decay.jacobian_source(), JacobianSource::Numeric);

    let x = grid(0.0, 8.0, 50);
    let y: Vec<f64> = x.iter().map(|v| 3.0 * (-v / 2.0).exp() + 0.5).collect();
    let data = Dataset::new("decay", &x, &y).unwrap();

    let model = catalog.resolve("mydecay").unwrap();
    assert_eq!(model.category(), ModelCategory::UserDefined);
    let config = FitConfig::new()
        .with_tolerance(1e-8)
        .with_hint("t", ParameterHint::initial(1.5));
    let result = Fitter::new(config).fit(&data, &model).unwrap();

    assert!(result.is_converged(), "{}", result.message);
    assert_relative_eq!(result.value("A").unwrap(), 3.0, max_relative = 1e-4);
    assert_relative_eq!(result.value("t").unwrap(), 2.0, max_relative = 1e-4);
    assert_relative_eq!(result.value("y0").unwrap(), 0.5, max_relative = 1e-4);
}

#[test]
fn user_function_calling_another() {
    let mut catalog = ModelCatalog::new();
    catalog.register_user("line", "m*x + b").unwrap();
    let scaled = catalog.register_user("wiggle", "line(x) + c*sin(x)").unwrap();
    assert_eq!(scaled.parameter_names(), vec!["b", "c", "m"]);

    let x = grid(0.0, 6.0, 40);
    let y: Vec<f64> = x.iter().map(|v| 0.5 * v - 1.0 + 2.0 * v.sin()).collect();
    let data = Dataset::new("wiggle", &x, &y).unwrap();

    let model = catalog.resolve("wiggle").unwrap();
    let result = Fitter::new(FitConfig::new().with_tolerance(1e-8))
        .fit(&data, &model)
        .unwrap();

    assert_relative_eq!(result.value("m").unwrap(), 0.5, epsilon = 1e-5);
    assert_relative_eq!(result.value("b").unwrap(), -1.0, epsilon = 1e-5);
    assert_relative_eq!(result.value("c").unwrap(), 2.0, epsilon = 1e-5);
}

#[test]
fn user_function_with_simplex() {
    let mut catalog = ModelCatalog::new();
    catalog.register_user("quad", "a*x^2 + b").unwrap();
    let x = grid(-2.0, 2.0, 21);
    let y: Vec<f64> = x.iter().map(|v| 1.5 * v * v + 0.25).collect();
    let data = Dataset::new("quad", &x, &y).unwrap();

    let config = FitConfig::new()
        .with_algorithm(Algorithm::Simplex)
        .with_tolerance(1e-10);
    let result = Fitter::new(config)
        .fit(&data, &catalog.resolve("quad").unwrap())
        .unwrap();

    assert_relative_eq!(result.value("a").unwrap(), 1.5, epsilon = 1e-3);
    assert_relative_eq!(result.value("b").unwrap(), 0.25, epsilon = 1e-3);
}

#[test]
fn registration_errors() {
    let mut catalog = ModelCatalog::new();

    assert!(matches!(
        catalog.register_user("broken", "a*(x+"),
        Err(ModelError::Parse { .. })
    ));
    assert!(matches!(
        catalog.register_user("Lorentz", "a*x"),
        Err(ModelError::NameCollision(_))
    ));
    assert!(matches!(
        catalog.register_user("self", "a*self(x)"),
        Err(ModelError::RecursiveDefinition { .. })
    ));
    assert!(matches!(
        catalog.register_user("caller", "missing(x)"),
        Err(ModelError::UnknownFunction { .. })
    ));
    assert!(matches!(
        catalog.resolve("broken"),
        Err(ModelError::UnknownModel(_))
    ));
}

#[test]
fn mutual_recursion_is_rejected() {
    let mut catalog = ModelCatalog::new();
    catalog.register_user("p", "a*x").unwrap();
    catalog.register_user("q", "p(x) + b").unwrap();

    let err = catalog.register_user("p", "q(x)").unwrap_err();
    assert!(matches!(err, ModelError::RecursiveDefinition { .. }));
    assert!(err.to_string().contains("p -> q -> p"));
}

#[test]
fn peak_fits_carry_a_breakdown() {
    let model = ModelCatalog::new().resolve("lorentz").unwrap();
    let x = grid(0.0, 10.0, 101);
    let truth = [4.0, 5.5, 1.0, 0.2];
    let y: Vec<f64> = x.iter().map(|&v| model.evaluate(v, &truth)).collect();
    let data = Dataset::new("peak", &x, &y).unwrap();

    let result = Fitter::new(FitConfig::new().with_tolerance(1e-8))
        .fit(&data, &model)
        .unwrap();

    let peaks = result.peaks.as_ref().unwrap();
    assert_eq!(peaks.len(), 1);
    assert_eq!(peaks[0].index, 1);
    assert_relative_eq!(peaks[0].center, 5.5, epsilon = 1e-6);
    assert_relative_eq!(peaks[0].width, 1.0, epsilon = 1e-6);
    assert_relative_eq!(peaks[0].area, 4.0, epsilon = 1e-6);
    // Lorentzian height: 2A / (pi w)
    assert_relative_eq!(
        peaks[0].height,
        8.0 / std::f64::consts::PI,
        epsilon = 1e-6
    );
}
