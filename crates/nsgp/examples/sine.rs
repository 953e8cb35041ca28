use ndarray::{concatenate, Array, Array2, Axis};
use nsgp::{Linspaced, NsgpRegression};

fn chirp(x: &Array2<f64>) -> Array2<f64> {
    x.mapv(|v| (v * v).sin())
}

fn main() {
    env_logger::init();

    let xt = Array::linspace(0., 4., 25).insert_axis(Axis(1));
    let yt = chirp(&xt);

    println!("Train NSGP on 'sin(x^2)' at {}", xt.column(0));
    let mut nsgp = NsgpRegression::new(&xt, &yt, 5, &Linspaced, 42).expect("NSGP built");
    let outcome = nsgp.optimize(200, true).expect("NSGP trained");
    println!(
        "Loss {:.4} -> {:.4} in {} iterations",
        outcome.initial_cost, outcome.best_cost, outcome.iterations
    );
    println!("{nsgp}");

    let xtest = Array::linspace(0., 4., 41).insert_axis(Axis(1));
    let ytest = chirp(&xtest);
    let (ypred, cov) = nsgp.predict(&xtest).expect("NSGP prediction");
    let ysigma = cov.diag().mapv(f64::sqrt).insert_axis(Axis(1));
    let lengthscales = nsgp.local_lengthscales(&xtest).expect("Lengthscales");

    println!("Compute prediction errors (x, err(x), sigma(x), l(x))");
    println!(
        "{}",
        concatenate![Axis(1), xtest, ypred - ytest, ysigma, lengthscales]
    );
}
