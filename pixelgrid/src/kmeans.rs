//! Provides the implementation for (sort) k-means over normalized RGB colors

use palette::Srgb;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoroshiro128PlusPlus;

/// Parameters for the k-means clustering used to reduce a palette
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KmeansParams {
	/// The number of times to run k-means, keeping the trial with the lowest variance (default: `10`)
	///
	/// k-means can get stuck in a local minimum, so running several trials gives more stable centroids.
	/// A value of `0` means no trials are run and the palette is left unreduced.
	pub trials: u32,
	/// The maximum number of iterations for each trial (default: `300`)
	pub max_iter: u32,
	/// A trial stops once the total movement of all centroids in one iteration
	/// is at most this value, in normalized RGB units (default: `1e-4`)
	pub convergence_threshold: f32,
	/// The seed for the random number generator used to pick the initial centroids (default: `0`)
	pub seed: u64,
}

impl Default for KmeansParams {
	fn default() -> Self {
		Self {
			trials: 10,
			max_iter: 300,
			convergence_threshold: 1e-4,
			seed: 0,
		}
	}
}

/// Squared euclidean distance between two normalized RGB colors
fn squared_distance(x: Srgb<f32>, y: Srgb<f32>) -> f32 {
	let dr = x.red - y.red;
	let dg = x.green - y.green;
	let db = x.blue - y.blue;
	dr * dr + dg * dg + db * db
}

/// A zero vector sum
const ZERO_SUM: Srgb<f64> = Srgb::new(0.0, 0.0, 0.0);

/// Bookkeeping for each k-means data point
struct PointData {
	/// Center assignment for this data point
	assignment: Vec<u16>,
	/// Weight of each data point used to randomly select starting centroids in k-means++
	weight: Vec<f32>,
}

impl PointData {
	/// Create a [`PointData`] with the given number data points
	fn new(n: usize) -> Self {
		Self {
			assignment: vec![0; n],
			weight: vec![f32::INFINITY; n],
		}
	}

	/// Reset data for the next k-means trial
	fn reset(&mut self) {
		// assignments are corrected every iteration
		self.weight.fill(f32::INFINITY);
	}
}

/// Data for each center/centroid
struct CenterData {
	/// The centroid point
	centroid: Vec<Srgb<f32>>,
	/// Vector sum for all data points in this center
	sum: Vec<Srgb<f64>>,
	/// Number of points in this center
	count: Vec<u32>,
}

impl CenterData {
	/// Create a [`CenterData`] with the given number of centers
	fn new(k: u16) -> Self {
		let k = usize::from(k);
		Self {
			centroid: Vec::new(),
			sum: vec![ZERO_SUM; k],
			count: vec![0; k],
		}
	}

	/// Reset data for the next k-means trial
	fn reset(&mut self) {
		self.centroid.clear();
		self.sum.fill(ZERO_SUM);
		self.count.fill(0);
	}
}

/// Holds all the state used by k-means
struct KmeansState {
	/// Data for each center
	centers: CenterData,
	/// One fourth of the squared distance between each pairs of centers
	distances: Vec<(u16, f32)>,
	/// Data for each point
	points: PointData,
}

impl KmeansState {
	/// Initialize a new [`KmeansState`] with `k` centers and `n` data points
	fn new(k: u16, n: usize) -> Self {
		Self {
			centers: CenterData::new(k),
			distances: vec![(0, 0.0); usize::from(k) * usize::from(k)],
			points: PointData::new(n),
		}
	}
}

/// Result from running k-means
#[derive(Debug, Clone)]
pub struct KmeansResult {
	/// Sum of the squared distances from each point to its centroid
	///
	/// A lower variance indicates a higher accuracy.
	pub variance: f64,
	/// Final centroids, with each channel in `0.0..=1.0`
	pub centroids: Vec<Srgb<f32>>,
	/// Number of points in each centroid
	pub counts: Vec<u32>,
	/// Number of elapsed iterations
	pub iterations: u32,
}

impl KmeansResult {
	/// Create an empty result, representing that no k-means trials were able to be run
	const fn empty() -> Self {
		Self {
			variance: 0.0,
			centroids: Vec::new(),
			counts: Vec::new(),
			iterations: 0,
		}
	}
}

/// Choose the starting centroids using the k-means++ algorithm
fn kmeans_plus_plus(
	k: u16,
	rng: &mut impl Rng,
	points: &[Srgb<f32>],
	centroids: &mut Vec<Srgb<f32>>,
	weights: &mut [f32],
) {
	use rand::{
		distributions::{WeightedError::*, WeightedIndex},
		prelude::Distribution,
	};

	// Pick any random first centroid
	centroids.push(points[rng.gen_range(0..points.len())]);

	// Pick each next centroid with a weighted probability based off the squared distance to its closest centroid
	for i in 1..usize::from(k) {
		let centroid = centroids[i - 1];
		for (weight, &point) in weights.iter_mut().zip(points) {
			*weight = f32::min(*weight, squared_distance(point, centroid));
		}

		match WeightedIndex::new(&*weights) {
			Ok(sampler) => centroids.push(points[sampler.sample(rng)]),
			Err(AllWeightsZero) => return, // all points exactly match a centroid
			Err(InvalidWeight | NoItem | TooMany) => {
				unreachable!("distances are >= 0 and points is not empty")
			},
		}
	}
}

/// Initializes the center sums and counts based off the initial centroids
fn compute_initial_sums(points: &[Srgb<f32>], centers: &mut CenterData, assignment: &[u16]) {
	for (&point, &center) in points.iter().zip(assignment) {
		let i = usize::from(center);
		let sum = &mut centers.sum[i];
		sum.red += f64::from(point.red);
		sum.green += f64::from(point.green);
		sum.blue += f64::from(point.blue);
		centers.count[i] += 1;
	}
}

/// For each pair of centers, update their distances and sort each center's row by increasing distance
// i and j are < centroids.len() <= u16::MAX
#[allow(clippy::cast_possible_truncation)]
fn update_distances(centroids: &[Srgb<f32>], distances: &mut [(u16, f32)]) {
	let k = centroids.len();
	for i in 0..k {
		let ci = centroids[i];
		distances[i * k + i] = (i as u16, 0.0);
		for j in (i + 1)..k {
			let cj = centroids[j];
			let dist = squared_distance(ci, cj) / 4.0;
			distances[j * k + i] = (i as u16, dist);
			distances[i * k + j] = (j as u16, dist);
		}
	}

	for row in distances[..(k * k)].chunks_exact_mut(k) {
		row.sort_by(|(_, x), (_, y)| f32::total_cmp(x, y));
	}
}

/// For each data point, update its assigned center
fn update_assignments(points: &[Srgb<f32>], centers: &mut CenterData, distances: &[(u16, f32)], data: &mut PointData) {
	let k = centers.centroid.len();
	for (&point, center) in points.iter().zip(&mut data.assignment) {
		let ci = usize::from(*center);
		let dist = squared_distance(point, centers.centroid[ci]);

		// Find the closest center
		let mut min_dist = dist;
		let mut min_center = *center;
		for &(other_center, half_dist) in &distances[(ci * k + 1)..((ci + 1) * k)] {
			if dist < half_dist {
				break;
			}

			let other_dist = squared_distance(point, centers.centroid[usize::from(other_center)]);
			if other_dist < min_dist {
				min_dist = other_dist;
				min_center = other_center;
			}
		}

		// Move this point to its new center
		if min_center != *center {
			let r = f64::from(point.red);
			let g = f64::from(point.green);
			let b = f64::from(point.blue);

			let old_sum = &mut centers.sum[ci];
			old_sum.red -= r;
			old_sum.green -= g;
			old_sum.blue -= b;
			centers.count[ci] -= 1;

			let cj = usize::from(min_center);

			let new_sum = &mut centers.sum[cj];
			new_sum.red += r;
			new_sum.green += g;
			new_sum.blue += b;
			centers.count[cj] += 1;

			*center = min_center;
		}
	}
}

/// For each center, update its centroid using the vector sums and compute deltas
fn update_centroids(rng: &mut impl Rng, centers: &mut CenterData) -> f32 {
	let mut total_delta = 0.0;
	for ((centroid, &n), sum) in centers.centroid.iter_mut().zip(&centers.count).zip(&centers.sum) {
		let new_centroid = if n == 0 {
			// An empty center is moved to a random point in the unit cube
			Srgb::new(
				rng.gen_range(0.0..=1.0),
				rng.gen_range(0.0..=1.0),
				rng.gen_range(0.0..=1.0),
			)
		} else {
			let n = f64::from(n);
			// Sums may need greater precision, but the average can fall back down to a reduced precision
			#[allow(clippy::cast_possible_truncation)]
			Srgb::new((sum.red / n) as f32, (sum.green / n) as f32, (sum.blue / n) as f32)
		};

		total_delta += squared_distance(*centroid, new_centroid).sqrt();
		*centroid = new_centroid;
	}

	total_delta
}

/// Run a trial of sort k-means
fn kmeans(
	points: &[Srgb<f32>],
	KmeansState { centers, distances, points: data }: &mut KmeansState,
	k: u16,
	max_iter: u32,
	convergence: f32,
	seed: u64,
) -> KmeansResult {
	let mut rng = Xoroshiro128PlusPlus::seed_from_u64(seed);
	kmeans_plus_plus(k, &mut rng, points, &mut centers.centroid, &mut data.weight);
	compute_initial_sums(points, centers, &data.assignment);

	let mut iterations = 0;
	let mut total_delta = f32::INFINITY;
	while iterations < max_iter && total_delta > convergence {
		update_distances(&centers.centroid, distances);
		update_assignments(points, centers, distances, data);
		total_delta = update_centroids(&mut rng, centers);
		iterations += 1;
	}

	let variance = points
		.iter()
		.zip(&data.assignment)
		.map(|(&point, &center)| f64::from(squared_distance(point, centers.centroid[usize::from(center)])))
		.sum();

	let centroids = centers
		.centroid
		.iter()
		.zip(&centers.count)
		.filter_map(|(&color, &count)| if count == 0 { None } else { Some(color) })
		.collect::<Vec<_>>();

	let counts = centers.count.iter().copied().filter(|&n| n > 0).collect::<Vec<_>>();

	centers.reset();
	data.reset();

	KmeansResult { variance, centroids, counts, iterations }
}

/// Run multiple trials of k-means, taking the trial with the lowest variance.
///
/// Each trial `i` is seeded with `seed ^ i`, so the result only depends on the points and parameters.
/// An empty result with no centroids is returned if `points` is empty, `trials` = 0, or `k` = 0.
#[must_use]
pub fn run(points: &[Srgb<f32>], k: u16, params: &KmeansParams) -> KmeansResult {
	let KmeansParams { trials, max_iter, convergence_threshold, seed } = *params;

	if k == 0 || points.is_empty() {
		return KmeansResult::empty();
	}

	let mut state = KmeansState::new(k, points.len());

	(0..trials)
		.map(|i| kmeans(points, &mut state, k, max_iter, convergence_threshold, seed ^ u64::from(i)))
		.min_by(|x, y| f64::total_cmp(&x.variance, &y.variance))
		.unwrap_or(KmeansResult::empty())
}
