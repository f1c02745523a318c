//! 가중치 기반 워커 배치
//!
//! [`spread`]는 필요한 워커 수와 내림차순으로 정렬된 호스트 가중치를 받아
//! 호스트별 워커 수를 계산합니다. [`place`]는 그 결과에 따라 워커 alias를
//! 호스트에 연속 구간으로 나눠 줍니다.
//!
//! 비례 배분 단계는 호스트를 정해진 순서로 방문하며 올림(ceil)으로 할당하고,
//! 마지막으로 방문한 호스트가 남은 수를 흡수합니다. 결과가 고정된 테스트가 있으므로
//! 이 반올림 순서를 그대로 유지해야 합니다.

/// 호스트별 워커 수를 계산합니다.
///
/// `weights`는 내림차순으로 정렬되어 있어야 합니다.
///
/// - `total < 2`이면 `[total]`을 반환합니다.
/// - 가중치가 0보다 큰 호스트는 먼저 1개씩 받습니다. 그 사이 `total`이 소진되면 즉시 반환합니다.
/// - 정확히 1개가 남으면 가장 큰 가중치(동률이면 앞쪽)를 가진 호스트가 받습니다.
/// - 그 외에는 `r = total / sum(weights)` 비율로 `ceil(weight * r)`씩 순서대로 더하며,
///   합계가 `total`에 도달하는 호스트에서 멈춥니다.
///
/// 가중치가 모두 0이면 모든 호스트가 0을 받습니다. 이때 `total >= 2`이면 합계가
/// `total`과 같지 않으므로, 호출자는 가중치가 0보다 큰 호스트를 하나 이상 넘겨야
/// 합니다. 설계 문서 검증은 이런 호스트 구성을 거부합니다.
pub fn spread(total: usize, weights: &[u32]) -> Vec<usize> {
    if total < 2 {
        return vec![total];
    }

    let mut counts = vec![0usize; weights.len()];
    let mut assigned = 0usize;
    let mut sum = 0u64;
    for (i, &w) in weights.iter().enumerate() {
        if w < 1 {
            continue;
        }
        counts[i] = 1;
        assigned += 1;
        sum += u64::from(w);

        if assigned == total {
            return counts;
        }
    }

    if sum == 0 {
        return counts;
    }

    match total - assigned {
        0 => counts,
        1 => {
            let mut top = 0;
            for (i, &w) in weights.iter().enumerate() {
                if w > weights[top] {
                    top = i;
                }
            }
            counts[top] += 1;
            counts
        }
        _ => {
            let ratio = total as f64 / sum as f64;
            loop {
                for (i, &w) in weights.iter().enumerate() {
                    let share = (f64::from(w) * ratio).ceil() as usize;
                    let next = assigned + share;
                    if next >= total {
                        counts[i] += total - assigned;
                        return counts;
                    }
                    counts[i] += share;
                    assigned = next;
                }
            }
        }
    }
}

/// 호스트에 배정된 워커 구간
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement<'a, H> {
    pub host: &'a H,
    pub workers: Vec<String>,
}

/// 워커를 호스트에 배치합니다.
///
/// 호스트는 가중치 내림차순으로 (같은 가중치는 선언 순서대로) 정렬된 뒤
/// [`spread`] 결과만큼 `workers`의 연속 구간을 받습니다. 0개를 받은 호스트는 결과에서 빠집니다.
pub fn place<'a, H, F>(hosts: &'a [H], weight: F, workers: &[String]) -> Vec<Placement<'a, H>>
where
    F: Fn(&H) -> u32,
{
    let mut by_weight: Vec<&H> = hosts.iter().collect();
    by_weight.sort_by_key(|h| std::cmp::Reverse(weight(*h)));

    let weights: Vec<u32> = by_weight.iter().map(|h| weight(*h)).collect();
    let counts = spread(workers.len(), &weights);

    let mut placements = Vec::new();
    let mut offset = 0;
    for (i, host) in by_weight.into_iter().enumerate() {
        let count = counts.get(i).copied().unwrap_or(0);
        if count < 1 {
            continue;
        }
        let end = (offset + count).min(workers.len());
        placements.push(Placement {
            host,
            workers: workers[offset..end].to_vec(),
        });
        offset = end;
    }
    placements
}
