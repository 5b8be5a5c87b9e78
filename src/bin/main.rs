use std::{pin::Pin, ptr::NonNull};

use embedded_collections::{
    list::{self, List},
    multimap::{self, MultiMap},
    Linked,
};

// A job is queued in arrival order and indexed by deadline at the same time. Each container sees
// the job through its own link record.
#[derive(Debug)]
#[repr(C)]
struct Job {
    queue: list::Links<Job>,
    by_deadline: multimap::Links<Deadline, u32>,
    name: &'static str,
}

// The deadline index's view of a `Job`.
#[repr(transparent)]
struct Deadline(Job);

unsafe impl Linked<list::Links<Job>> for Job {
    type Handle = Pin<&'static Job>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::from(r.get_ref())
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Pin::new_unchecked(&*ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<list::Links<Job>> {
        // SAFETY: Self is #[repr(C)] and `queue` is first field
        ptr.cast()
    }
}

unsafe impl Linked<multimap::Links<Deadline, u32>> for Deadline {
    type Handle = Pin<&'static Deadline>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::from(r.get_ref())
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Pin::new_unchecked(&*ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<multimap::Links<Deadline, u32>> {
        let job = ptr.cast::<Job>();
        unsafe { NonNull::new_unchecked(std::ptr::addr_of_mut!((*job.as_ptr()).by_deadline)) }
    }
}

fn job(name: &'static str) -> Pin<&'static Job> {
    let job = Box::leak(Box::new(Job {
        queue: list::Links::new(),
        by_deadline: multimap::Links::new(),
        name,
    }));

    Pin::static_ref(job)
}

fn as_deadline(job: Pin<&'static Job>) -> Pin<&'static Deadline> {
    // SAFETY: `Deadline` is a transparent wrapper around `Job`
    unsafe { Pin::new_unchecked(&*(job.get_ref() as *const Job as *const Deadline)) }
}

fn main() {
    let mut queue: List<Job> = List::new();
    let mut deadlines: MultiMap<Deadline, u32> = MultiMap::new();

    for (name, deadline) in [("build", 30), ("test", 20), ("lint", 20), ("deploy", 50)] {
        let job = job(name);
        queue.push_back(job);
        deadlines.insert(deadline, as_deadline(job));
    }

    queue.assert_invariants();
    deadlines.assert_invariants();

    println!(
        "arrival order: {:?}",
        queue.iter().map(|job| job.name).collect::<Vec<_>>()
    );
    println!(
        "by deadline:   {:?}",
        deadlines
            .iter()
            .map(|(deadline, job)| (job.0.name, *deadline))
            .collect::<Vec<_>>()
    );

    let mut graph = String::new();
    if deadlines.dotgraph("deadlines", &mut graph).is_ok() {
        println!("{graph}");
    }

    // Run the most urgent job: it leaves both containers.
    while let Some(urgent) = deadlines.pop_first() {
        let job = NonNull::from(&urgent.get_ref().0);
        unsafe { queue.remove(job) };

        println!(
            "ran {:<6} ({} still queued)",
            urgent.0.name,
            queue.len()
        );

        queue.assert_invariants();
        deadlines.assert_invariants();
    }
}
